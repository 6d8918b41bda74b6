//! Device template manifest (`templates.json`).
//!
//! The firmware owns this file and has shipped it in three layouts:
//!
//! - a top-level array of entries
//! - an object with a single array-of-objects member (`{"templates": [...]}`)
//! - an object keyed by arbitrary ids whose values are entries
//!
//! The layout is detected on every load and the same layout is written back.
//! Entries this panel does not touch are preserved verbatim, including any
//! fields it does not model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::layout::MANIFEST_PATH;
use crate::remote::{CopyDirection, RemoteChannel};

/// Category marking entries owned by this panel.
pub const CUSTOM_CATEGORY: &str = "Custom";

/// Icon code written for every managed entry.
pub const CUSTOM_ICON_CODE: &str = "\u{e90d}";

/// One template as listed in the device manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,

    /// File name on the device without extension
    pub filename: String,

    #[serde(rename = "iconCode", default)]
    pub icon_code: String,

    #[serde(default)]
    pub categories: Vec<String>,
}

impl ManifestEntry {
    /// An entry marked as managed by this panel.
    pub fn custom(name: &str, filename_no_ext: &str) -> Self {
        Self {
            name: name.to_string(),
            filename: filename_no_ext.to_string(),
            icon_code: CUSTOM_ICON_CODE.to_string(),
            categories: vec![CUSTOM_CATEGORY.to_string()],
        }
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// Physical layout of a manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestShape {
    Array,
    WrappedArray { key: String },
    KeyedMap,
}

/// Classify a decoded manifest. First matching rule wins.
pub fn classify(root: &Value) -> Result<ManifestShape> {
    match root {
        Value::Array(_) => Ok(ManifestShape::Array),
        Value::Object(map) => {
            let mut wrapped = map.iter().filter(|(_, v)| is_array_of_objects(v));
            match (wrapped.next(), wrapped.next()) {
                (Some((key, _)), None) => Ok(ManifestShape::WrappedArray { key: key.clone() }),
                _ => Ok(ManifestShape::KeyedMap),
            }
        }
        _ => Err(Error::ManifestUnreadable(
            "templates.json root is neither an array nor an object".to_string(),
        )),
    }
}

fn is_array_of_objects(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().all(Value::is_object))
}

/// Synthesized key for a new entry in a keyed-map manifest.
pub fn custom_key(filename_no_ext: &str) -> String {
    let sanitized: String = filename_no_ext
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("custom_{}", sanitized)
}

fn filename_of(value: &Value) -> Option<&str> {
    value.get("filename").and_then(Value::as_str)
}

/// A decoded manifest together with its detected layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    shape: ManifestShape,
    root: Value,
}

impl ManifestDocument {
    pub fn parse(json: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(json)
            .map_err(|e| Error::ManifestUnreadable(format!("templates.json parse error: {}", e)))?;
        let shape = classify(&root)?;
        Ok(Self { shape, root })
    }

    pub fn shape(&self) -> &ManifestShape {
        &self.shape
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.root)
            .map_err(|e| Error::ManifestUpdateFailed(e.to_string()))
    }

    /// Raw entry values in document order.
    fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match (&self.shape, &self.root) {
            (ManifestShape::Array, Value::Array(items)) => Box::new(items.iter()),
            (ManifestShape::WrappedArray { key }, Value::Object(map)) => match map.get(key) {
                Some(Value::Array(items)) => Box::new(items.iter()),
                _ => Box::new(std::iter::empty()),
            },
            (ManifestShape::KeyedMap, Value::Object(map)) => Box::new(map.values()),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Entries that decode as templates; malformed values are skipped.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.values()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn find_by_category(&self, category: &str) -> Vec<ManifestEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.in_category(category))
            .collect()
    }

    pub fn find_by_filename(&self, filename_no_ext: &str) -> Option<ManifestEntry> {
        self.values()
            .find(|v| filename_of(v) == Some(filename_no_ext))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Replace the entry with the same filename in place, or add it.
    pub fn upsert(&mut self, entry: &ManifestEntry) -> Result<()> {
        let value = serde_json::to_value(entry)
            .map_err(|e| Error::ManifestUpdateFailed(e.to_string()))?;

        match (&self.shape, &mut self.root) {
            (ManifestShape::Array, Value::Array(items)) => {
                upsert_in_list(items, &entry.filename, value)
            }
            (ManifestShape::WrappedArray { key }, Value::Object(map)) => match map.get_mut(key) {
                Some(Value::Array(items)) => upsert_in_list(items, &entry.filename, value),
                _ => {
                    return Err(Error::ManifestUpdateFailed(format!(
                        "templates.json member '{}' is no longer an array",
                        key
                    )));
                }
            },
            (ManifestShape::KeyedMap, Value::Object(map)) => {
                upsert_in_map(map, &entry.filename, value)
            }
            _ => {
                return Err(Error::ManifestUpdateFailed(
                    "templates.json layout changed while editing".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn upsert_in_list(items: &mut Vec<Value>, filename: &str, value: Value) {
    match items.iter_mut().find(|v| filename_of(v) == Some(filename)) {
        Some(existing) => *existing = value,
        None => items.push(value),
    }
}

fn upsert_in_map(map: &mut Map<String, Value>, filename: &str, value: Value) {
    match map.values_mut().find(|v| filename_of(v) == Some(filename)) {
        Some(existing) => *existing = value,
        None => {
            // Keys are lowercased, so `Dots` and `dots` can collide
            let base = custom_key(filename);
            let mut key = base.clone();
            let mut suffix = 1;
            while map.contains_key(&key) {
                key = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            map.insert(key, value);
        }
    }
}

/// Loads and saves the manifest on the device through a `RemoteChannel`.
pub struct ManifestStore<C> {
    channel: C,
    remote_path: String,
    /// Serializes load-mutate-save cycles within this process
    update_lock: Mutex<()>,
}

impl<C: RemoteChannel> ManifestStore<C> {
    pub fn new(channel: C) -> Self {
        Self::with_path(channel, MANIFEST_PATH)
    }

    pub fn with_path(channel: C, remote_path: &str) -> Self {
        Self {
            channel,
            remote_path: remote_path.to_string(),
            update_lock: Mutex::new(()),
        }
    }

    /// Download and decode the manifest, detecting its layout afresh.
    pub async fn load(&self) -> Result<ManifestDocument> {
        let scratch = tempfile::NamedTempFile::new()?;
        let out = self
            .channel
            .copy(scratch.path(), &self.remote_path, CopyDirection::FromRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::ManifestUnreadable))?;
        if !out.success() {
            return Err(Error::ManifestUnreadable(format!(
                "Download templates.json failed: {}",
                out.output
            )));
        }

        let json = tokio::fs::read_to_string(scratch.path())
            .await
            .map_err(|e| Error::ManifestUnreadable(e.to_string()))?;
        ManifestDocument::parse(&json)
    }

    /// Upload the whole document, replacing the device copy.
    pub async fn save(&self, doc: &ManifestDocument) -> Result<()> {
        let scratch = tempfile::NamedTempFile::new()?;
        tokio::fs::write(scratch.path(), doc.to_json()?)
            .await
            .map_err(|e| Error::ManifestUpdateFailed(e.to_string()))?;

        let out = self
            .channel
            .copy(scratch.path(), &self.remote_path, CopyDirection::ToRemote)
            .await
            .map_err(|e| Error::from_remote(e, Error::ManifestUpdateFailed))?;
        if !out.success() {
            return Err(Error::ManifestUpdateFailed(format!(
                "Upload templates.json failed: {}",
                out.output
            )));
        }
        Ok(())
    }

    /// Full round trip: download, upsert `entry`, upload.
    ///
    /// Any failure is reported as `ManifestUpdateFailed`.
    pub async fn upsert_entry(&self, entry: &ManifestEntry) -> Result<ManifestShape> {
        let _guard = self.update_lock.lock().await;

        let mut doc = self.load().await.map_err(|e| match e {
            Error::ManifestUnreadable(msg) => Error::ManifestUpdateFailed(msg),
            other => other,
        })?;
        doc.upsert(entry)?;
        self.save(&doc).await?;

        tracing::info!(
            "Updated templates.json entry '{}' ({:?})",
            entry.filename,
            doc.shape()
        );
        Ok(doc.shape().clone())
    }
}
