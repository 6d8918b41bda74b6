//! control-panel: web control panel for a tablet reachable over SSH.
//!
//! Provides:
//! - Local template library and device template sync
//! - System image listing and replacement
//! - Device configuration editing and UI restart
//! - PDF upload with one-time code pairing

pub mod api;
pub mod config;
pub mod session;
pub mod settings;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use device_sync::{
    DeviceControl, ImageReplacer, LocalLibrary, PairingService, RemoteChannel, SyncEngine,
    UploadTool,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::settings::SettingsStore;

pub type Channel = Arc<dyn RemoteChannel>;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub settings: SettingsStore,
    pub library: Arc<LocalLibrary>,
    pub sync: SyncEngine<Channel>,
    pub images: ImageReplacer<Channel>,
    pub device: DeviceControl<Channel>,
    pub pairing: PairingService<Arc<dyn UploadTool>>,
}

impl AppState {
    /// Wire up services over the given remote channel and upload tool.
    pub fn new(
        config: Config,
        settings: SettingsStore,
        data_dir: &Path,
        channel: Channel,
        tool: Arc<dyn UploadTool>,
    ) -> anyhow::Result<Self> {
        let library = Arc::new(LocalLibrary::open(data_dir.join("library"))?);
        let ttl = config.pairing.session_ttl();

        Ok(Self {
            sync: SyncEngine::new(channel.clone(), library.clone()),
            images: ImageReplacer::new(channel.clone(), library.clone()),
            device: DeviceControl::new(channel),
            pairing: PairingService::new(tool, data_dir.join("staging"), ttl),
            library,
            settings,
            config,
        })
    }
}

/// Build the API router
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/connection", get(api::device::check_connection))
        .route(
            "/api/settings",
            get(api::settings::get_settings).post(api::settings::save_settings),
        )
        .route(
            "/api/templates/local",
            get(api::templates::list_local).post(api::templates::upload_local),
        )
        .route("/api/templates/device", get(api::templates::list_device))
        .route("/api/templates/push", post(api::templates::push))
        .route("/api/templates/pull", post(api::templates::pull))
        .route("/api/device/restart", post(api::device::restart))
        .route(
            "/api/device/config",
            get(api::device::read_config).post(api::device::write_config),
        )
        .route("/api/images", get(api::images::list))
        .route("/api/images/raw", get(api::images::raw))
        .route("/api/images/replace", post(api::images::replace))
        .route("/api/documents", post(api::documents::upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(session::user_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
