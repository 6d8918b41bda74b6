//! System images on the device: listing, fetching and replacing.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::layout::{BACKUP_SUFFIX, SYSTEM_IMAGES_DIR};
use crate::library::LocalLibrary;
use crate::remote::{CopyDirection, RemoteChannel, shell_quote};

/// One image found on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteImageDescriptor {
    pub filename: String,
    pub path: String,
    pub size: u64,
}

/// Accept only PNG files directly inside the system image directory.
pub fn validate_image_path(path: &str) -> Result<()> {
    let invalid = || Error::InvalidRemotePath(path.to_string());

    let name = path
        .strip_prefix(SYSTEM_IMAGES_DIR)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(invalid)?;
    if name.is_empty()
        || name.contains('/')
        || name.starts_with('.')
        || !name.to_ascii_lowercase().ends_with(".png")
    {
        return Err(invalid());
    }
    Ok(())
}

pub struct ImageReplacer<C> {
    channel: C,
    library: Arc<LocalLibrary>,
}

impl<C: RemoteChannel> ImageReplacer<C> {
    pub fn new(channel: C, library: Arc<LocalLibrary>) -> Self {
        Self { channel, library }
    }

    /// List the top-level PNG files of the system image directory.
    pub async fn list_system_images(&self) -> Result<Vec<RemoteImageDescriptor>> {
        let command = format!(
            "find {} -maxdepth 1 -name '*.png' -type f | sort",
            shell_quote(SYSTEM_IMAGES_DIR)
        );
        let out = self
            .channel
            .exec(&command)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to list images: {}",
                out.output
            )));
        }

        let mut images = Vec::new();
        for path in out.output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let filename = path.rsplit('/').next().unwrap_or(path).to_string();
            let size = self.remote_size(path).await;
            images.push(RemoteImageDescriptor {
                filename,
                path: path.to_string(),
                size,
            });
        }
        Ok(images)
    }

    /// Size in bytes, or 0 when `stat` fails.
    async fn remote_size(&self, path: &str) -> u64 {
        match self
            .channel
            .exec(&format!("stat -c%s {}", shell_quote(path)))
            .await
        {
            Ok(out) if out.success() => out.output.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Download one system image.
    pub async fn fetch_image(&self, path: &str) -> Result<Vec<u8>> {
        validate_image_path(path)?;

        let scratch = tempfile::NamedTempFile::new()?;
        let out = self
            .channel
            .copy(scratch.path(), path, CopyDirection::FromRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to download image: {}",
                out.output
            )));
        }
        Ok(tokio::fs::read(scratch.path()).await?)
    }

    /// Overwrite a device image with a library file, keeping a `.backup` copy.
    ///
    /// Each step runs only if the previous one succeeded. Nothing is rolled
    /// back, so a failed permission fix leaves the new image in place.
    pub async fn replace(&self, target: &str, replacement_filename: &str) -> Result<()> {
        validate_image_path(target)?;
        let local = self.library.resolve(replacement_filename)?;

        let backup = format!(
            "cp {} {}",
            shell_quote(target),
            shell_quote(&format!("{}{}", target, BACKUP_SUFFIX))
        );
        let out = self
            .channel
            .exec(&backup)
            .await
            .map_err(|e| Error::from_remote(e, Error::BackupFailed))?;
        if !out.success() {
            return Err(Error::BackupFailed(out.output));
        }

        let out = self
            .channel
            .copy(&local, target, CopyDirection::ToRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::TransferFailed))?;
        if !out.success() {
            return Err(Error::TransferFailed(format!(
                "Failed to upload replacement image: {}",
                out.output
            )));
        }

        let out = self
            .channel
            .exec(&format!("chmod 644 {}", shell_quote(target)))
            .await
            .map_err(|e| Error::from_remote(e, Error::PermissionFixFailed))?;
        if !out.success() {
            tracing::warn!("{} replaced but permissions were not fixed", target);
            return Err(Error::PermissionFixFailed(out.output));
        }

        tracing::info!("Replaced {} with {}", target, replacement_filename);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CommandOutput, InMemoryRemote, RemoteCall};
    use tempfile::TempDir;

    const SUSPENDED: &str = "/usr/share/remarkable/suspended.png";

    fn replacer() -> (TempDir, Arc<InMemoryRemote>, ImageReplacer<Arc<InMemoryRemote>>) {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(LocalLibrary::open(dir.path().join("library")).unwrap());
        let remote = Arc::new(InMemoryRemote::new());
        let replacer = ImageReplacer::new(remote.clone(), library);
        (dir, remote, replacer)
    }

    #[test]
    fn test_validate_image_path() {
        assert!(validate_image_path(SUSPENDED).is_ok());
        assert!(validate_image_path("/usr/share/remarkable/Starting.PNG").is_ok());

        for bad in [
            "/usr/share/remarkable/templates/grid.png",
            "/usr/share/remarkable/../../etc/shadow.png",
            "/usr/share/remarkable/notes.txt",
            "/usr/share/remarkable/",
            "/usr/share/remarkableX/a.png",
            "/etc/passwd",
        ] {
            assert!(
                matches!(validate_image_path(bad), Err(Error::InvalidRemotePath(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_replace_runs_steps_in_order() {
        let (_dir, remote, replacer) = replacer();
        let filename = replacer.library.store(b"new", "Sleep", "png").unwrap();

        replacer.replace(SUSPENDED, &filename).await.unwrap();

        assert_eq!(
            remote.calls(),
            vec![
                RemoteCall::Exec(format!(
                    "cp '{}' '{}.backup'",
                    SUSPENDED, SUSPENDED
                )),
                RemoteCall::CopyTo {
                    remote: SUSPENDED.to_string()
                },
                RemoteCall::Exec(format!("chmod 644 '{}'", SUSPENDED)),
            ]
        );
        assert_eq!(remote.file(SUSPENDED).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_replace_backup_failure_never_overwrites() {
        let (_dir, remote, replacer) = replacer();
        remote.put_file(SUSPENDED, "original");
        remote.respond("cp ", CommandOutput::new(1, "cp: read-only file system"));
        let filename = replacer.library.store(b"new", "Sleep", "png").unwrap();

        let result = replacer.replace(SUSPENDED, &filename).await;
        assert!(matches!(result, Err(Error::BackupFailed(msg)) if msg.contains("read-only")));
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(remote.file(SUSPENDED).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_replace_missing_replacement() {
        let (_dir, remote, replacer) = replacer();

        let result = replacer.replace(SUSPENDED, "ghost.png").await;
        assert!(matches!(result, Err(Error::ContentMissing(_))));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replace_permission_fix_failure_keeps_new_image() {
        let (_dir, remote, replacer) = replacer();
        remote.respond("chmod ", CommandOutput::new(1, "chmod: operation not permitted"));
        let filename = replacer.library.store(b"new", "Sleep", "png").unwrap();

        let result = replacer.replace(SUSPENDED, &filename).await;
        assert!(matches!(result, Err(Error::PermissionFixFailed(_))));
        assert_eq!(remote.file(SUSPENDED).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_replace_transfer_failure_skips_chmod() {
        let (_dir, remote, replacer) = replacer();
        remote.fail_copy(SUSPENDED, "scp: Connection reset");
        let filename = replacer.library.store(b"new", "Sleep", "png").unwrap();

        let result = replacer.replace(SUSPENDED, &filename).await;
        assert!(matches!(result, Err(Error::TransferFailed(_))));
        assert!(!remote.executed().iter().any(|c| c.starts_with("chmod")));
    }

    #[tokio::test]
    async fn test_list_system_images_with_sizes() {
        let (_dir, remote, replacer) = replacer();
        remote.respond(
            "find ",
            CommandOutput::ok(
                "/usr/share/remarkable/poweroff.png\n/usr/share/remarkable/suspended.png\n",
            ),
        );
        remote.respond(
            "stat -c%s '/usr/share/remarkable/poweroff.png'",
            CommandOutput::ok("20480\n"),
        );
        remote.respond(
            "stat -c%s '/usr/share/remarkable/suspended.png'",
            CommandOutput::new(1, "stat: cannot stat"),
        );

        let images = replacer.list_system_images().await.unwrap();
        assert_eq!(
            images,
            vec![
                RemoteImageDescriptor {
                    filename: "poweroff.png".into(),
                    path: "/usr/share/remarkable/poweroff.png".into(),
                    size: 20480,
                },
                RemoteImageDescriptor {
                    filename: "suspended.png".into(),
                    path: SUSPENDED.into(),
                    size: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let (_dir, remote, replacer) = replacer();
        remote.put_file(SUSPENDED, "png-bytes");

        assert_eq!(replacer.fetch_image(SUSPENDED).await.unwrap(), b"png-bytes");
        assert!(matches!(
            replacer.fetch_image("/etc/shadow").await,
            Err(Error::InvalidRemotePath(_))
        ));
    }
}
