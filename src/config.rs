use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::eviction::EvictionPolicyType;

/// Complete Tagstash configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TagstashConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Tag cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persisted tag capacities (.json or .toml)
    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    /// Eviction policy: lru, fifo
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
            eviction_policy: default_eviction_policy(),
        }
    }
}

/// Resource loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory resource names are resolved against
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
        }
    }
}

fn default_settings_file() -> String {
    "cache_settings.json".to_string()
}

fn default_eviction_policy() -> String {
    "lru".to_string()
}

fn default_models_dir() -> String {
    "models".to_string()
}

impl TagstashConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: TagstashConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = TagstashConfig {
            cache: CacheConfig {
                settings_file: ".tagstash/cache_settings.toml".to_string(),
                eviction_policy: "lru".to_string(),
            },
            loader: LoaderConfig {
                models_dir: "models".to_string(),
            },
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.settings_file.trim().is_empty() {
            anyhow::bail!("cache.settings_file must be set");
        }

        let extension = Path::new(&self.cache.settings_file)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        if !matches!(extension.as_deref(), Some("json") | Some("toml")) {
            anyhow::bail!(
                "cache.settings_file must end with .json or .toml: {}",
                self.cache.settings_file
            );
        }

        self.eviction_policy()
            .context("cache.eviction_policy must be one of: lru, fifo")?;

        if self.loader.models_dir.trim().is_empty() {
            anyhow::bail!("loader.models_dir must be set");
        }

        Ok(())
    }

    pub fn eviction_policy(&self) -> Result<EvictionPolicyType> {
        self.cache.eviction_policy.parse()
    }

    /// Settings file path, relative paths resolved against `base`
    pub fn settings_path(&self, base: &Path) -> PathBuf {
        base.join(&self.cache.settings_file)
    }

    /// Models directory, relative paths resolved against `base`
    pub fn models_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.loader.models_dir)
    }
}
