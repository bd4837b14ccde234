//! Replay a workflow of node steps over several graph passes
//!
//! Each pass walks the steps in order. Before running a step its
//! fingerprint is compared with the one recorded the last time it ran;
//! an unchanged fingerprint skips the step the way a graph scheduler
//! would. Steps whose output depends only on their inputs run once.
//!
//! ```toml
//! [[step]]
//! op = "load"
//! loader = "checkpoint"
//! name = "sd15.safetensors"
//! key = "base"
//! mode = "Override Cache"
//!
//! [[step]]
//! op = "retrieve"
//! key = "base"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cli::ReplayArgs;
use crate::cli_utils::tagstash_prefix;
use crate::commands::settings::read_settings;
use crate::merger::MergedConfig;
use tagstash::cache::report;
use tagstash::load_policy::Origin;
use tagstash::logging::{operations, services, status};
use tagstash::nodes::{
    handle, Artifact, Backend, CascadeCacheMode, Checkpoint, Handle, ResourceLoader,
    SharedLoader, UnclipCheckpoint,
};
use tagstash::{CacheKey, Fingerprint, LoadMode};

#[derive(Debug, Deserialize)]
pub struct Workflow {
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read workflow: {}", path.as_ref().display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse workflow: {}", path.as_ref().display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Cache {
        key: CacheKey,
        #[serde(default)]
        tag: String,
        value: String,
    },
    CacheList {
        key: CacheKey,
        #[serde(default)]
        tag: String,
        values: Vec<String>,
    },
    Retrieve {
        key: CacheKey,
    },
    Remove {
        key: CacheKey,
    },
    Show,
    Apply {
        settings: String,
    },
    Load {
        loader: SharedLoader,
        name: String,
        #[serde(default)]
        key: String,
        #[serde(default)]
        mode: LoadMode,
    },
    Cascade {
        stage_b: String,
        #[serde(default)]
        key_b: String,
        stage_c: String,
        #[serde(default)]
        key_c: String,
        #[serde(default)]
        cache_mode: CascadeCacheMode,
    },
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Self::Cache { .. } => "cache",
            Self::CacheList { .. } => "cache_list",
            Self::Retrieve { .. } => "retrieve",
            Self::Remove { .. } => "remove",
            Self::Show => "show",
            Self::Apply { .. } => "apply",
            Self::Load { .. } => "load",
            Self::Cascade { .. } => "cascade",
        }
    }

    /// `None` when the step depends on nothing but its own inputs
    fn fingerprint(&self, backend: &Backend) -> Result<Option<Fingerprint>> {
        Ok(match self {
            Self::Retrieve { key } => Some(backend.retrieve_fingerprint(key)),
            Self::Show => Some(backend.show_cached_info_fingerprint()),
            Self::Load {
                loader,
                name,
                key,
                mode,
            } => Some(backend.shared_fingerprint(*loader, name, key, *mode)?),
            Self::Cache { .. }
            | Self::CacheList { .. }
            | Self::Remove { .. }
            | Self::Apply { .. }
            | Self::Cascade { .. } => None,
        })
    }

    fn execute(&self, backend: &Backend, loader: &dyn ResourceLoader) -> Result<String> {
        Ok(match self {
            Self::Cache { key, tag, value } => {
                backend.cache_data(key.clone(), tag, Artifact::data(value.clone()));
                stored(key, tag, 1)
            }
            Self::CacheList { key, tag, values } => {
                let artifacts = values.iter().cloned().map(Artifact::data).collect();
                backend.cache_data_list(key.clone(), tag, artifacts);
                stored(key, tag, values.len())
            }
            Self::Retrieve { key } => match backend.retrieve(key) {
                Some(values) => {
                    let described: Vec<String> = values.iter().map(describe).collect();
                    format!("{} value(s): {}", values.len(), described.join(", "))
                }
                None => format!("'{}' is unregistered", key),
            },
            Self::Remove { key } => {
                backend.remove(key);
                if key.is_reserved() {
                    "cleared all entries".to_string()
                } else {
                    format!("removed '{}'", key)
                }
            }
            Self::Show => backend.show_cached_info(),
            Self::Apply { settings } => {
                if backend.apply_cache_info(settings)? {
                    "settings changed".to_string()
                } else {
                    "settings unchanged".to_string()
                }
            }
            Self::Load {
                loader: kind,
                name,
                key,
                mode,
            } => {
                let loaded = backend.load_shared(*kind, loader, name, key, *mode)?;
                let origin = match loaded.origin {
                    Origin::Loaded => "loaded",
                    Origin::Cached => "reused",
                };
                format!("{} '{}' as '{}' ({})", origin, name, loaded.key, loaded.tag)
            }
            Self::Cascade {
                stage_b,
                key_b,
                stage_c,
                key_c,
                cache_mode,
            } => {
                let models = backend.load_stable_cascade(
                    loader,
                    stage_b,
                    key_b,
                    stage_c,
                    key_c,
                    *cache_mode,
                )?;
                format!("stage B as '{}', stage C as '{}'", models.key_b, models.key_c)
            }
        })
    }
}

fn stored(key: &CacheKey, tag: &str, count: usize) -> String {
    if key.is_reserved() {
        format!("reserved key '{}' not stored", key)
    } else {
        format!("stored {} value(s) as '{}' ({})", count, key, tag)
    }
}

fn describe(artifact: &Artifact) -> String {
    match artifact.downcast_data::<String>() {
        Some(text) => text.clone(),
        None => format!("<{}>", artifact.kind()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ran,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub pass: u32,
    pub step: usize,
    pub op: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Run `passes` graph passes of `workflow` against `backend`
pub fn replay(
    workflow: &Workflow,
    backend: &Backend,
    loader: &dyn ResourceLoader,
    passes: u32,
) -> Result<Vec<StepOutcome>> {
    // Fingerprint recorded when each step last ran
    let mut last_run: Vec<Option<Option<Fingerprint>>> = vec![None; workflow.steps.len()];
    let mut outcomes = Vec::new();

    for pass in 1..=passes {
        for (idx, step) in workflow.steps.iter().enumerate() {
            let number = idx + 1;
            let fingerprint = step
                .fingerprint(backend)
                .with_context(|| format!("Step {} ({}) failed", number, step.op()))?;

            let unchanged = match (&last_run[idx], &fingerprint) {
                (None, _) => false,
                (Some(None), None) => true,
                (Some(Some(previous)), Some(current)) => current.is_unchanged_since(previous),
                _ => false,
            };

            if unchanged {
                debug!(pass, step = number, op = step.op(), "step skipped");
                outcomes.push(StepOutcome {
                    pass,
                    step: number,
                    op: step.op(),
                    status: StepStatus::Skipped,
                    detail: None,
                });
                continue;
            }

            let detail = step
                .execute(backend, loader)
                .with_context(|| format!("Step {} ({}) failed", number, step.op()))?;
            last_run[idx] = Some(fingerprint);
            outcomes.push(StepOutcome {
                pass,
                step: number,
                op: step.op(),
                status: StepStatus::Ran,
                detail: Some(detail),
            });
        }
    }

    Ok(outcomes)
}

/// Resolves resource names to files under a models directory
///
/// Handles carry the file path; the file contents are never read.
pub struct DirectoryLoader {
    root: PathBuf,
}

/// What a [`DirectoryLoader`] handle points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub component: &'static str,
}

impl DirectoryLoader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        if !path.is_file() {
            anyhow::bail!("Resource not found: {}", path.display());
        }
        info!(
            service = services::LOADER,
            operation = operations::LOAD,
            status = status::SUCCESS,
            "Loading {}",
            path.display()
        );
        Ok(path)
    }

    fn component(path: &Path, component: &'static str) -> Handle {
        handle(LoadedFile {
            path: path.to_path_buf(),
            component,
        })
    }
}

impl ResourceLoader for DirectoryLoader {
    fn load_checkpoint(&self, name: &str) -> Result<Checkpoint> {
        let path = self.resolve(name)?;
        Ok(Checkpoint {
            model: Self::component(&path, "model"),
            clip: Self::component(&path, "clip"),
            vae: Self::component(&path, "vae"),
        })
    }

    fn load_unclip_checkpoint(&self, name: &str) -> Result<UnclipCheckpoint> {
        let path = self.resolve(name)?;
        Ok(UnclipCheckpoint {
            model: Self::component(&path, "model"),
            clip: Self::component(&path, "clip"),
            vae: Self::component(&path, "vae"),
            clip_vision: Self::component(&path, "clip_vision"),
        })
    }

    fn load_upscale_model(&self, name: &str) -> Result<Handle> {
        Ok(Self::component(&self.resolve(name)?, "upscale_model"))
    }

    fn load_controlnet(&self, name: &str) -> Result<Handle> {
        Ok(Self::component(&self.resolve(name)?, "controlnet"))
    }

    fn load_clip_vision(&self, name: &str) -> Result<Handle> {
        Ok(Self::component(&self.resolve(name)?, "clip_vision"))
    }
}

#[derive(Serialize)]
struct ReplaySummary<'a> {
    passes: u32,
    steps: &'a [StepOutcome],
    evictions: u64,
    eviction_runs: u64,
    report: String,
}

pub fn run(args: ReplayArgs) -> Result<()> {
    let config = MergedConfig::load(&args.config_args)?;
    let workflow = Workflow::from_file(&args.workflow)?;

    let settings = read_settings(&config.settings_file)?;
    let backend = Backend::new(settings, config.eviction_policy);
    let loader = DirectoryLoader::new(&config.models_dir);

    let outcomes = replay(&workflow, &backend, &loader, args.passes)?;
    let (evictions, eviction_runs, report) = {
        let cache = backend.lock();
        let stats = cache.stats();
        (
            stats.get_evictions_total(),
            stats.get_eviction_runs(),
            report::render(&*cache),
        )
    };

    if args.json {
        let summary = ReplaySummary {
            passes: args.passes,
            steps: &outcomes,
            evictions,
            eviction_runs,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for outcome in &outcomes {
        match (&outcome.status, &outcome.detail) {
            (StepStatus::Ran, Some(detail)) if detail.contains('\n') => {
                println!("[pass {}] #{} {}:", outcome.pass, outcome.step, outcome.op);
                for line in detail.lines() {
                    println!("    {}", line);
                }
            }
            (StepStatus::Ran, detail) => println!(
                "[pass {}] #{} {}: {}",
                outcome.pass,
                outcome.step,
                outcome.op,
                detail.as_deref().unwrap_or_default()
            ),
            (StepStatus::Skipped, _) => println!(
                "[pass {}] #{} {}: skipped (unchanged)",
                outcome.pass, outcome.step, outcome.op
            ),
        }
    }
    if evictions > 0 {
        eprintln!(
            "{} Evicted {} entries over {} runs",
            tagstash_prefix(),
            evictions,
            eviction_runs
        );
    }

    Ok(())
}
