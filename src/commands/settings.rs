use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::cli::SettingsCommands;
use crate::cli_utils::tagstash_prefix;
use crate::merger::MergedConfig;
use tagstash::cache::report;
use tagstash::{TagSettings, TaggedCache};

pub fn run(command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Show { config_args } => {
            let merged = MergedConfig::load(&config_args)?;
            show(&merged.settings_file)
        }
        SettingsCommands::Apply {
            report,
            dry_run,
            config_args,
        } => {
            let merged = MergedConfig::load(&config_args)?;
            apply(&report, &merged.settings_file, dry_run)
        }
    }
}

/// Persisted settings, empty when the file does not exist yet
pub fn read_settings(path: &Path) -> Result<TagSettings> {
    if path.exists() {
        TagSettings::load(path)
    } else {
        info!("No settings file at {}, all tags unbounded", path.display());
        Ok(TagSettings::new())
    }
}

fn show(settings_file: &Path) -> Result<()> {
    let settings = read_settings(settings_file)?;
    let cache: TaggedCache<()> = TaggedCache::new(settings);
    print!("{}", report::render(&cache));
    Ok(())
}

fn apply(source: &str, settings_file: &Path, dry_run: bool) -> Result<()> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read report from stdin")?;
        text
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read report: {}", source))?
    };

    let settings = report::parse_settings(&text)
        .with_context(|| format!("Failed to parse settings section of {}", source))?;
    let current = read_settings(settings_file)?;

    if settings == current {
        eprintln!("{} Settings unchanged", tagstash_prefix());
        return Ok(());
    }

    for (tag, capacity) in settings.iter() {
        match current.capacity(tag) {
            Some(old) if old == capacity => {}
            Some(old) => println!("  ~ {}: {} -> {}", tag, old, capacity),
            None => println!("  + {}: {}", tag, capacity),
        }
    }
    for (tag, capacity) in current.iter() {
        if settings.capacity(tag).is_none() {
            println!("  - {}: {}", tag, capacity);
        }
    }

    if dry_run {
        eprintln!("{} Dry run, {} not written", tagstash_prefix(), settings_file.display());
        return Ok(());
    }

    settings.save(settings_file)?;
    eprintln!(
        "{} Saved {} tag settings to {}",
        tagstash_prefix(),
        settings.len(),
        settings_file.display()
    );
    Ok(())
}
