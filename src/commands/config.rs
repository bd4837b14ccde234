use anyhow::Result;
use tracing::info;

use crate::cli::{CommonConfigArgs, ConfigCommands};
use crate::merger::MergedConfig;
use tagstash::TagstashConfig;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { config_args } => show(&config_args),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = TagstashConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Settings file: {}", config.cache.settings_file);
    println!("  - Eviction policy: {}", config.cache.eviction_policy);
    println!("  - Models directory: {}", config.loader.models_dir);

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");

    println!("{}", TagstashConfig::example()?);

    Ok(())
}

fn show(config_args: &CommonConfigArgs) -> Result<()> {
    info!("Showing effective configuration");

    let merged = MergedConfig::load(config_args)?;

    println!("Effective Configuration:\n");
    match &merged.config_path {
        Some(path) => println!("# from {}", path.display()),
        None => println!("# built-in defaults"),
    }
    println!("{}", toml::to_string_pretty(&merged)?);

    Ok(())
}
