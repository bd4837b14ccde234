use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::cli::InspectArgs;
use crate::commands::settings::read_settings;
use crate::merger::MergedConfig;

#[derive(Debug, Serialize)]
struct Inspection {
    config: MergedConfig,
    tag_settings: BTreeMap<String, usize>,
    resources: Vec<Resource>,
}

#[derive(Debug, Serialize)]
struct Resource {
    name: String,
    size_bytes: u64,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let config = MergedConfig::load(&args.config_args)?;
    let tag_settings = read_settings(&config.settings_file)?
        .iter()
        .map(|(tag, capacity)| (tag.to_string(), capacity))
        .collect();
    let resources = list_resources(&config.models_dir)?;

    let inspection = Inspection {
        config,
        tag_settings,
        resources,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    let config = &inspection.config;
    println!("Tagstash Inspection");
    println!("===================");
    match &config.config_path {
        Some(path) => println!("Config:          {}", path.display()),
        None => println!("Config:          (defaults)"),
    }
    println!("Settings file:   {}", config.settings_file.display());
    println!("Eviction policy: {}", config.eviction_policy.as_str());
    println!("Models dir:      {}", config.models_dir.display());

    println!("\nTag capacities:");
    if inspection.tag_settings.is_empty() {
        println!("  (none, all tags unbounded)");
    }
    for (tag, capacity) in &inspection.tag_settings {
        println!("  {}: {}", tag, capacity);
    }

    println!("\nResources:");
    if inspection.resources.is_empty() {
        println!("  (none)");
    }
    for resource in &inspection.resources {
        println!("  {} ({} bytes)", resource.name, resource.size_bytes);
    }

    Ok(())
}

/// Files directly under `dir`, sorted by name; a missing directory is empty
fn list_resources(dir: &Path) -> Result<Vec<Resource>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut resources = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read models directory: {}", dir.display()))?
    {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            resources.push(Resource {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: metadata.len(),
            });
        }
    }
    resources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(resources)
}
