//! Preview catalog
//!
//! Read-only lookup from a map key (genre id, artist id, ...) to the audio clip
//! that previews it. The catalog is authored as TOML or JSON:
//!
//! ```toml
//! [previews.jazz]
//! source_locator = "https://p.scdn.co/mp3-preview/d1a1a7b5"
//! target_gain = 0.4
//! ```
//!
//! `preview_url` and `volume` are accepted as aliases for the two fields.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One previewable clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioResourceDescriptor {
    /// Catalog key, also used by the map for labels and colors
    pub key: String,

    /// Where the clip lives (http(s) URL, file:// URL or filesystem path)
    pub source_locator: String,

    /// Steady-state gain of the preview, in (0, 1]
    pub target_gain: f32,
}

impl AudioResourceDescriptor {
    pub fn new(key: impl Into<String>, source_locator: impl Into<String>, target_gain: f32) -> Self {
        Self {
            key: key.into(),
            source_locator: source_locator.into(),
            target_gain,
        }
    }

    /// Validate the gain range and locator.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_gain > 0.0 && self.target_gain <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "target_gain for '{}' must be in (0, 1], got {}",
                self.key, self.target_gain
            )));
        }
        if self.source_locator.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "source_locator for '{}' is empty",
                self.key
            )));
        }
        Ok(())
    }
}

/// On-disk record (the key comes from the table name).
#[derive(Debug, Deserialize)]
struct PreviewRecord {
    #[serde(alias = "preview_url")]
    source_locator: String,
    #[serde(alias = "volume")]
    target_gain: f32,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    previews: BTreeMap<String, PreviewRecord>,
}

/// Key → descriptor lookup table.
///
/// Completeness is not checked; a key without an entry simply has no preview.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, AudioResourceDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from descriptors, rejecting invalid ones.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = AudioResourceDescriptor>,
    {
        let mut catalog = Self::new();
        for descriptor in descriptors {
            catalog.insert(descriptor)?;
        }
        Ok(catalog)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, descriptor: AudioResourceDescriptor) -> Result<()> {
        descriptor.validate()?;
        self.entries.insert(descriptor.key.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&AudioResourceDescriptor> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_file(file)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::from_file(file)
    }

    /// Load a catalog file. `.json` files are parsed as JSON, everything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("catalog file {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let catalog = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };

        debug!("Loaded {} preview entries from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    fn from_file(file: CatalogFile) -> Result<Self> {
        Self::from_descriptors(file.previews.into_iter().map(|(key, record)| {
            AudioResourceDescriptor::new(key, record.source_locator, record.target_gain)
        }))
    }
}
