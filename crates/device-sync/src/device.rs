//! Device housekeeping: connectivity, UI restart and the UI configuration file.

use crate::error::{Error, Result};
use crate::layout::{BACKUP_SUFFIX, DEVICE_CONFIG_PATH, RESTART_COMMAND};
use crate::remote::{CopyDirection, RemoteChannel, shell_quote};

pub struct DeviceControl<C> {
    channel: C,
    config_path: String,
}

impl<C: RemoteChannel> DeviceControl<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config_path(channel, DEVICE_CONFIG_PATH)
    }

    pub fn with_config_path(channel: C, config_path: &str) -> Self {
        Self {
            channel,
            config_path: config_path.to_string(),
        }
    }

    /// Run a no-op command on the device.
    pub async fn check_connection(&self) -> Result<()> {
        let out = self
            .channel
            .exec("echo \"Connection test\"")
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::TransferFailed(format!("Connection failed: {}", out.output)))
        }
    }

    pub async fn restart(&self) -> Result<()> {
        let out = self
            .channel
            .exec(RESTART_COMMAND)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to restart device UI: {}",
                out.output
            )));
        }
        tracing::info!("Restarted device UI");
        Ok(())
    }

    pub async fn read_config(&self) -> Result<String> {
        let scratch = tempfile::NamedTempFile::new()?;
        let out = self
            .channel
            .copy(scratch.path(), &self.config_path, CopyDirection::FromRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to read device configuration: {}",
                out.output
            )));
        }
        Ok(tokio::fs::read_to_string(scratch.path()).await?)
    }

    /// Replace the configuration file, backing up the old one on the device.
    pub async fn write_config(&self, text: &str, restart: bool) -> Result<()> {
        let backup = format!(
            "cp {} {}",
            shell_quote(&self.config_path),
            shell_quote(&format!("{}{}", self.config_path, BACKUP_SUFFIX))
        );
        let out = self
            .channel
            .exec(&backup)
            .await
            .map_err(|e| Error::from_remote(e, Error::BackupFailed))?;
        if !out.success() {
            return Err(Error::BackupFailed(out.output));
        }

        let scratch = tempfile::NamedTempFile::new()?;
        tokio::fs::write(scratch.path(), text).await?;
        let out = self
            .channel
            .copy(scratch.path(), &self.config_path, CopyDirection::ToRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to save device configuration: {}",
                out.output
            )));
        }
        tracing::info!("Saved device configuration");

        if restart {
            self.restart().await?;
        }
        Ok(())
    }
}
