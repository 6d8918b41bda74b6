//! Error kinds surfaced by device operations.
//!
//! Every variant renders as a human-readable message; the control panel shows
//! these verbatim, often with raw remote command output attached.

use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found in local library: {0}")]
    ContentMissing(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Device manifest unreadable: {0}")]
    ManifestUnreadable(String),

    #[error("Failed to update templates.json: {0}")]
    ManifestUpdateFailed(String),

    #[error("Failed to backup original file: {0}")]
    BackupFailed(String),

    #[error("Failed to set permissions: {0}")]
    PermissionFixFailed(String),

    #[error("Invalid code. The one-time code should be 8 characters.")]
    InvalidCodeFormat,

    #[error("Invalid authentication code. Please try again.")]
    InvalidCode,

    #[error("Missing connection details: configure the device host and user first")]
    NoRemoteConfigured,

    #[error("No pending upload. Please upload the file again.")]
    NoPendingUpload,

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    #[error("Local library error: {0}")]
    Library(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the caller should prompt for a pairing code.
    pub fn needs_auth(&self) -> bool {
        matches!(self, Error::InvalidCodeFormat | Error::InvalidCode)
    }

    /// Map a transport failure into the kind for the step that failed.
    ///
    /// A missing connection configuration is reported as such regardless of step.
    pub fn from_remote(err: RemoteError, kind: fn(String) -> Error) -> Error {
        match err {
            RemoteError::NotConfigured => Error::NoRemoteConfigured,
            other => kind(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Library(err.to_string())
    }
}
