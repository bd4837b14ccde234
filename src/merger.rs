/// Configuration merger: CLI args > Env vars > Config file > Defaults
///
/// Paths given on the command line are taken relative to the working
/// directory; paths from a config file are relative to that file.
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::CommonConfigArgs;
use tagstash::config_discovery::{load_config_with_discovery, LoadedConfig};
use tagstash::EvictionPolicyType;

/// Effective configuration for one command invocation
#[derive(Debug, Clone, Serialize)]
pub struct MergedConfig {
    /// Config file that was used, if any
    pub config_path: Option<PathBuf>,
    pub settings_file: PathBuf,
    #[serde(serialize_with = "serialize_policy")]
    pub eviction_policy: EvictionPolicyType,
    pub models_dir: PathBuf,
}

fn serialize_policy<S: serde::Serializer>(
    policy: &EvictionPolicyType,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(policy.as_str())
}

impl MergedConfig {
    /// Discover the config file (or use `--config`) and merge overrides into it
    pub fn load(args: &CommonConfigArgs) -> Result<Self> {
        let loaded = load_config_with_discovery(args.config.as_deref())?;
        Self::merge(args, loaded)
    }

    /// Merge configuration from CLI args and config file
    /// Precedence: CLI > env (already handled by clap) > config file > defaults
    pub fn merge(args: &CommonConfigArgs, loaded: LoadedConfig) -> Result<Self> {
        let mut effective = loaded.config.clone();
        if let Some(settings_file) = &args.config_settings_file {
            effective.cache.settings_file = settings_file.clone();
        }
        if let Some(policy) = &args.config_eviction_policy {
            effective.cache.eviction_policy = policy.clone();
        }
        if let Some(models_dir) = &args.config_models_dir {
            effective.loader.models_dir = models_dir.clone();
        }
        effective.validate().with_context(|| match &loaded.path {
            Some(path) => format!("Invalid configuration: {}", path.display()),
            None => "Invalid configuration".to_string(),
        })?;

        Ok(Self {
            settings_file: args
                .config_settings_file
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| loaded.settings_path()),
            models_dir: args
                .config_models_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| loaded.models_dir()),
            eviction_policy: effective.eviction_policy()?,
            config_path: loaded.path,
        })
    }
}
