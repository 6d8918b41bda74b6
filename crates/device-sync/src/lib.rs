//! device-sync: Template, image and document management for a tablet
//! reachable over SSH.
//!
//! This crate provides:
//! - The local template library and the device's `templates.json` manifest
//! - Pushing and pulling templates between them
//! - System image listing and backup-then-replace
//! - Document upload through an external tool with one-time code pairing
//! - RemoteChannel and UploadTool trait abstractions with test doubles

pub mod device;
pub mod error;
pub mod images;
pub mod layout;
pub mod library;
pub mod manifest;
pub mod pairing;
pub mod remote;
pub mod ssh;
pub mod sync_engine;

pub use device::DeviceControl;
pub use error::{Error, Result};
pub use images::{ImageReplacer, RemoteImageDescriptor};
pub use library::{ContentItem, ContentKind, LocalLibrary};
pub use manifest::{ManifestDocument, ManifestEntry, ManifestShape, ManifestStore};
pub use pairing::{PairingService, RmapiTool, ScriptedTool, UploadOutcome, UploadTool};
pub use remote::{CommandOutput, CopyDirection, InMemoryRemote, RemoteChannel, RemoteError};
pub use ssh::{ConnectionSettings, SharedSettings, SshChannel};
pub use sync_engine::SyncEngine;
