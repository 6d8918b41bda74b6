//! Local template library.
//!
//! A content directory plus `library.json`, shaped `{"templates": [{name, filename}]}`.
//! Entries are keyed by `filename`; files listed without a matching file on
//! disk are still listed, but fail when used.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const LIBRARY_FILE: &str = "library.json";

/// Display name used when an upload names nothing usable.
pub const DEFAULT_TEMPLATE_NAME: &str = "Custom Template";

/// A file tracked by the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Human-readable name
    pub name: String,
    /// Storage filename inside the content directory
    pub filename: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    templates: Vec<ContentItem>,
}

/// Content types accepted at each upload site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// PNG template images
    Template,
    /// PDF documents sent through the upload tool
    Document,
}

impl ContentKind {
    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Template => "png",
            ContentKind::Document => "pdf",
        }
    }

    /// Reject uploads whose original name carries a different extension.
    pub fn check(self, original_name: &str) -> Result<()> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if ext.as_deref() == Some(self.extension()) {
            Ok(())
        } else {
            Err(Error::UnsupportedContentType(format!(
                "Only {} files are accepted",
                self.extension().to_uppercase()
            )))
        }
    }
}

/// Reject names that could escape the content directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    let bad = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename == LIBRARY_FILE;
    if bad {
        return Err(Error::InvalidName(filename.to_string()));
    }
    Ok(())
}

/// Whitespace runs become `_`, then anything outside `[A-Za-z0-9_]` is dropped.
pub fn sanitize_display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            in_space = false;
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
            }
        }
    }
    out
}

/// Strip the last extension segment.
pub fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    }
}

pub struct LocalLibrary {
    dir: PathBuf,
    /// Serializes read-modify-write cycles of library.json
    lock: Mutex<()>,
}

impl LocalLibrary {
    /// Open the library at `dir`, creating the directory and an empty
    /// library.json if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let library = Self {
            dir,
            lock: Mutex::new(()),
        };
        if !library.manifest_path().exists() {
            library.write(&LibraryFile::default())?;
        }
        Ok(library)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(LIBRARY_FILE)
    }

    fn read(&self) -> Result<LibraryFile> {
        let content = std::fs::read_to_string(self.manifest_path())?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Library(format!("Library file parse error: {}", e)))
    }

    fn write(&self, library: &LibraryFile) -> Result<()> {
        let content = serde_json::to_string_pretty(library)
            .map_err(|e| Error::Library(e.to_string()))?;
        std::fs::write(self.manifest_path(), content)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ContentItem>> {
        Ok(self.read()?.templates)
    }

    /// Add an item, or rename the existing item with the same filename.
    pub fn upsert(&self, filename: &str, name: &str) -> Result<()> {
        validate_filename(filename)?;
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.upsert_locked(filename, name)
    }

    fn upsert_locked(&self, filename: &str, name: &str) -> Result<()> {
        let mut library = self.read()?;
        match library.templates.iter_mut().find(|t| t.filename == filename) {
            Some(existing) => existing.name = name.to_string(),
            None => library.templates.push(ContentItem {
                name: name.to_string(),
                filename: filename.to_string(),
            }),
        }
        self.write(&library)
    }

    /// Write `bytes` under a filename derived from `display_name` and record it.
    ///
    /// Collisions try `_1`, `_2`, ... before the extension; the first unused
    /// name wins.
    pub fn store(&self, bytes: &[u8], display_name: &str, extension: &str) -> Result<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut stem = sanitize_display_name(display_name);
        if stem.is_empty() {
            stem = "template".to_string();
        }

        let mut filename = format!("{}.{}", stem, extension);
        let mut suffix = 1;
        while self.dir.join(&filename).exists() {
            filename = format!("{}_{}.{}", stem, suffix, extension);
            suffix += 1;
        }

        std::fs::write(self.dir.join(&filename), bytes)?;
        self.upsert_locked(&filename, display_name)?;

        tracing::info!("Stored '{}' in local library as {}", display_name, filename);
        Ok(filename)
    }

    /// Path a storage filename would occupy in the content directory.
    pub fn content_path(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.dir.join(filename))
    }

    /// Path of an existing content file.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let path = self.content_path(filename)?;
        if !path.is_file() {
            return Err(Error::ContentMissing(filename.to_string()));
        }
        Ok(path)
    }
}
