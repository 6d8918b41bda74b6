//! Web control panel for a tablet reachable over SSH
//!
//! Serves a JSON API for:
//! - Managing a local template library and pushing templates to the device
//! - Browsing and replacing system images
//! - Editing the device UI configuration and restarting it
//! - Uploading PDFs through rmapi, including one-time code pairing

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use control_panel::config::Config;
use control_panel::settings::SettingsStore;
use control_panel::{AppState, Channel, app};
use device_sync::{RmapiTool, SshChannel, UploadTool};

#[derive(Parser, Debug)]
#[command(name = "control-panel")]
#[command(about = "Web control panel for managing a tablet over SSH")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "PANEL_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "PANEL_BIND")]
    bind: String,

    /// Directory for the template library, staging area and settings
    #[arg(long, default_value = "./data", env = "PANEL_DATA_DIR")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "control_panel=info,device_sync=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.data_dir)?;
    let settings = SettingsStore::load(&cli.data_dir)?;

    let channel: Channel = Arc::new(SshChannel::new(settings.shared()));
    let tool: Arc<dyn UploadTool> = Arc::new(RmapiTool::new(
        &config.pairing.upload_tool,
        cli.data_dir.join("rmapi-home"),
    ));
    let state = Arc::new(AppState::new(config, settings, &cli.data_dir, channel, tool)?);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting control panel on {}", addr);
    tracing::info!("Data directory: {:?}", cli.data_dir);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Control panel shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
