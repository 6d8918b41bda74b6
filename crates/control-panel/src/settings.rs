//! Persistent device connection settings.
//!
//! The in-memory copy is shared with the SSH channel, so a save is picked up
//! by the next remote call without a restart.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use device_sync::{ConnectionSettings, SharedSettings};
use serde::Deserialize;

/// Settings as submitted by the panel.
///
/// An absent password keeps the stored one; an empty string clears it.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, alias = "REMARKABLE_IP")]
    pub host: String,
    #[serde(default, alias = "REMARKABLE_USER")]
    pub user: String,
    #[serde(default, alias = "REMARKABLE_PASSWORD")]
    pub password: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
    current: SharedSettings,
}

impl SettingsStore {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("settings.json");
        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file: {:?}", path))?;
            let settings: ConnectionSettings =
                serde_json::from_str(&content).with_context(|| "Failed to parse settings.json")?;
            tracing::info!("Loaded connection settings for {}", settings.host);
            settings
        } else {
            tracing::info!("No settings found at {:?}, device not configured yet", path);
            ConnectionSettings::default()
        };

        Ok(Self {
            path,
            current: Arc::new(RwLock::new(settings)),
        })
    }

    /// Handle for remote channels that should follow saved settings
    pub fn shared(&self) -> SharedSettings {
        self.current.clone()
    }

    pub fn get(&self) -> ConnectionSettings {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply an update and persist it.
    pub fn save(&self, update: SettingsUpdate) -> Result<ConnectionSettings> {
        let mut next = self.get();
        next.host = update.host.trim().to_string();
        next.user = update.user.trim().to_string();
        if let Some(password) = update.password {
            next.password = password;
        }

        let content = serde_json::to_string_pretty(&next)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings: {:?}", self.path))?;

        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next.clone();
        tracing::info!("Saved connection settings for {}@{}", next.user, next.host);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn update(host: &str, user: &str, password: Option<&str>) -> SettingsUpdate {
        SettingsUpdate {
            host: host.to_string(),
            user: user.to_string(),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::load(dir.path()).unwrap();

        let settings = store.get();
        assert!(!settings.is_configured());
        assert_eq!(settings.user, "root");
    }

    #[test]
    fn test_save_persists_and_updates_shared() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::load(dir.path()).unwrap();
        let shared = store.shared();

        store.save(update(" 10.11.99.1 ", "root", Some("secret"))).unwrap();
        assert_eq!(shared.read().unwrap().host, "10.11.99.1");

        let reloaded = SettingsStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.get().password, "secret");
    }

    #[test]
    fn test_absent_password_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::load(dir.path()).unwrap();

        store.save(update("10.11.99.1", "root", Some("secret"))).unwrap();
        store.save(update("192.168.1.20", "root", None)).unwrap();
        assert_eq!(store.get().password, "secret");

        store.save(update("192.168.1.20", "root", Some(""))).unwrap();
        assert_eq!(store.get().password, "");
    }

    #[test]
    fn test_legacy_keys_accepted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"REMARKABLE_IP":"10.11.99.1","REMARKABLE_USER":"root","REMARKABLE_PASSWORD":"pw"}"#,
        )
        .unwrap();

        let settings = SettingsStore::load(dir.path()).unwrap().get();
        assert_eq!(settings.host, "10.11.99.1");
        assert_eq!(settings.password, "pw");
    }
}
