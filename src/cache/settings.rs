//! Per-tag capacity settings
//!
//! Persisted as a flat `tag -> capacity` mapping, either JSON
//! (`cache_settings.json`) or TOML:
//!
//! ```toml
//! ckpt = 2
//! controlnet = 4
//! ```
//!
//! Tags without an entry are unbounded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::logging::{operations, services, status};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSettings(BTreeMap<String, usize>);

impl TagSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity for `tag`, `None` when unbounded
    pub fn capacity(&self, tag: &str) -> Option<usize> {
        self.0.get(tag).copied()
    }

    pub fn set(&mut self, tag: impl Into<String>, capacity: usize) {
        self.0.insert(tag.into(), capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.0.iter().map(|(tag, capacity)| (tag.as_str(), *capacity))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Load settings from a JSON (`.json`) or TOML (any other extension) file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache settings: {}", path.display()))?;

        let settings = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse cache settings: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse cache settings: {}", path.display()))?
        };

        Ok(settings)
    }

    /// Load settings, falling back to an empty mapping (all tags unbounded)
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => {
                info!(
                    service = services::SETTINGS,
                    operation = operations::LOAD,
                    status = status::SUCCESS,
                    tags = settings.len(),
                    "Loaded cache settings from {}",
                    path.display()
                );
                settings
            }
            Err(e) => {
                error!(
                    service = services::SETTINGS,
                    operation = operations::LOAD,
                    status = status::ERROR,
                    "{:#}; all tags are unbounded",
                    e
                );
                Self::default()
            }
        }
    }

    /// Write settings back in the format implied by the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write cache settings: {}", path.display()))?;

        info!(
            service = services::SETTINGS,
            operation = operations::SAVE,
            status = status::SUCCESS,
            tags = self.len(),
            "Saved cache settings to {}",
            path.display()
        );
        Ok(())
    }
}

impl FromIterator<(String, usize)> for TagSettings {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
