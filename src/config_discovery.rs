use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::TagstashConfig;

pub const CONFIG_FILE_NAME: &str = "tagstash.toml";

/// Discovers Tagstash configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        // Try to go up one level
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(home) = dirs::home_dir() {
        let global_config = home.join(".config/tagstash/config.toml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Configuration together with the directory its relative paths resolve against
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TagstashConfig,
    /// File the configuration came from, `None` for defaults
    pub path: Option<PathBuf>,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.config.settings_path(&self.base_dir)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.config.models_dir(&self.base_dir)
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        let config = TagstashConfig::from_file(&path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            config,
            path: Some(path),
            base_dir,
        })
    }
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd,
/// falling back to defaults rooted at cwd when nothing is found.
pub fn load_config_with_discovery(explicit_path: Option<&str>) -> Result<LoadedConfig> {
    if let Some(config_path) = explicit_path {
        return LoadedConfig::from_path(PathBuf::from(config_path));
    }

    let current_dir =
        std::env::current_dir().context("Failed to get current directory for config discovery")?;

    match discover_config(&current_dir)? {
        Some(discovered_path) => {
            debug!("Using config: {}", discovered_path.display());
            LoadedConfig::from_path(discovered_path)
        }
        None => {
            warn!("No configuration file found, using defaults");
            Ok(LoadedConfig {
                config: TagstashConfig::default(),
                path: None,
                base_dir: current_dir,
            })
        }
    }
}
