//! Template transfers between the local library and the device.
//!
//! Push copies the file first and then records it in `templates.json`; a
//! failed manifest update leaves the copied file in place on the device.
//! Pull treats the manifest as optional metadata.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::template_path;
use crate::library::{ContentItem, ContentKind, LocalLibrary, strip_extension, validate_filename};
use crate::manifest::{CUSTOM_CATEGORY, ManifestEntry, ManifestStore};
use crate::remote::{CopyDirection, RemoteChannel};

pub struct SyncEngine<C> {
    channel: C,
    manifest: ManifestStore<C>,
    library: Arc<LocalLibrary>,
}

impl<C: RemoteChannel + Clone> SyncEngine<C> {
    pub fn new(channel: C, library: Arc<LocalLibrary>) -> Self {
        Self {
            manifest: ManifestStore::new(channel.clone()),
            channel,
            library,
        }
    }
}

impl<C: RemoteChannel> SyncEngine<C> {
    pub fn library(&self) -> &LocalLibrary {
        &self.library
    }

    /// Templates on the device that this panel manages.
    pub async fn device_templates(&self) -> Result<Vec<ManifestEntry>> {
        let doc = self.manifest.load().await?;
        Ok(doc.find_by_category(CUSTOM_CATEGORY))
    }

    /// Copy a library file to the device and register it in the manifest.
    pub async fn push_to_remote(&self, filename: &str, display_name: &str) -> Result<()> {
        let local = self.library.resolve(filename)?;

        let out = self
            .channel
            .copy(&local, &template_path(filename), CopyDirection::ToRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to upload template: {}",
                out.output
            )));
        }

        let entry = ManifestEntry::custom(display_name, strip_extension(filename));
        if let Err(e) = self.manifest.upsert_entry(&entry).await {
            tracing::warn!(
                "{} copied to device but templates.json was not updated: {}",
                filename,
                e
            );
            return Err(e);
        }

        tracing::info!("Pushed template {} ('{}') to device", filename, display_name);
        Ok(())
    }

    /// Copy a device template into the library.
    ///
    /// Accepts the extension-less name the manifest uses; `.png` is assumed.
    pub async fn pull_from_remote(&self, filename: &str) -> Result<ContentItem> {
        let extension = ContentKind::Template.extension();
        let filename = if filename
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", extension))
        {
            filename.to_string()
        } else {
            format!("{}.{}", filename, extension)
        };
        validate_filename(&filename)?;

        let destination = self.library.content_path(&filename)?;
        let scratch = tempfile::NamedTempFile::new_in(self.library.dir())?;
        let out = self
            .channel
            .copy(scratch.path(), &template_path(&filename), CopyDirection::FromRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to download template: {}",
                out.output
            )));
        }
        scratch
            .persist(&destination)
            .map_err(|e| Error::Library(e.to_string()))?;

        let name = match self.manifest.load().await {
            Ok(doc) => doc
                .find_by_filename(strip_extension(&filename))
                .map(|entry| entry.name),
            Err(e) => {
                tracing::warn!("Could not read templates.json for {}: {}", filename, e);
                None
            }
        }
        .unwrap_or_else(|| filename.clone());

        self.library.upsert(&filename, &name)?;
        tracing::info!("Pulled template {} ('{}') from device", filename, name);

        Ok(ContentItem { name, filename })
    }
}
