//! Configuration loading and management

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Main configuration for the control panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Document pairing configuration
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Largest accepted request body in bytes (default: 50 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// How long a staged upload waits for its one-time code (default: 1 hour)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Upload tool executable, looked up on PATH unless absolute
    #[serde(default = "default_upload_tool")]
    pub upload_tool: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            upload_tool: default_upload_tool(),
        }
    }
}

/// Longest accepted pairing session lifetime (30 days)
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

impl PairingConfig {
    /// Session lifetime, clamped to `1..=MAX_SESSION_TTL_SECS`
    pub fn session_ttl(&self) -> chrono::Duration {
        let secs = self.session_ttl_secs.clamp(1, MAX_SESSION_TTL_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 || self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            bail!(
                "pairing.session_ttl_secs must be between 1 and {}, got {}",
                MAX_SESSION_TTL_SECS,
                self.session_ttl_secs
            );
        }
        Ok(())
    }
}

fn default_session_ttl() -> u64 {
    3600 // 1 hour
}

fn default_upload_tool() -> String {
    "rmapi".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pairing: PairingConfig::default(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    /// Load configuration from the data directory, writing defaults if absent
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_file = data_dir.join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            config
                .pairing
                .validate()
                .with_context(|| format!("Invalid config file: {:?}", config_file))?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_file);
            let config = Config::default();

            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }
}
