// Common test utilities shared across acceptance tests
//
// Each test gets its own workspace: a temp directory holding a
// tagstash.toml, a models/ directory and the settings file. Commands run
// with that directory as cwd and with every TAGSTASH_* override cleared, so
// tests never see the developer's configuration.

#![allow(dead_code)]

use assert_cmd::Command;
use std::any::Any;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use tagstash::nodes::{handle, Checkpoint, Handle, ResourceLoader, UnclipCheckpoint};

const ENV_OVERRIDES: &[&str] = &[
    "TAGSTASH_CONFIG",
    "TAGSTASH_CONFIG_SETTINGS_FILE",
    "TAGSTASH_CONFIG_EVICTION_POLICY",
    "TAGSTASH_CONFIG_MODELS_DIR",
    "TAGSTASH_LOG_FORMAT",
];

pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Workspace with a default config
    pub fn new() -> Self {
        Self::with_config("[cache]\nsettings_file = \"cache_settings.json\"\neviction_policy = \"lru\"\n\n[loader]\nmodels_dir = \"models\"\n")
    }

    pub fn with_config(config: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("models")).unwrap();
        fs::write(temp_dir.path().join("tagstash.toml"), config).unwrap();
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn settings_path(&self) -> PathBuf {
        self.path().join("cache_settings.json")
    }

    pub fn create_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.path().join(path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }

        fs::write(&file_path, content).unwrap();
        file_path
    }

    pub fn create_model(&self, name: &str) -> PathBuf {
        self.create_file(&format!("models/{}", name), "weights")
    }

    pub fn tagstash(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tagstash"));
        cmd.current_dir(self.path());
        for var in ENV_OVERRIDES {
            cmd.env_remove(var);
        }
        cmd.env("RUST_LOG", "warn");
        cmd
    }
}

/// In-memory loader that counts how often each resource was read
#[derive(Default)]
pub struct CountingLoader {
    calls: RefCell<Vec<String>>,
}

impl CountingLoader {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == name).count()
    }

    fn load(&self, name: &str) -> anyhow::Result<Handle> {
        if name.starts_with("missing") {
            anyhow::bail!("no such resource: {}", name);
        }
        self.calls.borrow_mut().push(name.to_string());
        Ok(handle(name.to_string()))
    }
}

impl ResourceLoader for CountingLoader {
    fn load_checkpoint(&self, name: &str) -> anyhow::Result<Checkpoint> {
        Ok(Checkpoint {
            model: self.load(name)?,
            clip: handle("clip"),
            vae: handle("vae"),
        })
    }

    fn load_unclip_checkpoint(&self, name: &str) -> anyhow::Result<UnclipCheckpoint> {
        Ok(UnclipCheckpoint {
            model: self.load(name)?,
            clip: handle("clip"),
            vae: handle("vae"),
            clip_vision: handle("clip_vision"),
        })
    }

    fn load_upscale_model(&self, name: &str) -> anyhow::Result<Handle> {
        self.load(name)
    }

    fn load_controlnet(&self, name: &str) -> anyhow::Result<Handle> {
        self.load(name)
    }

    fn load_clip_vision(&self, name: &str) -> anyhow::Result<Handle> {
        self.load(name)
    }
}

/// Resource name a [`CountingLoader`] handle was created for
pub fn loaded_name(handle: &(dyn Any + Send + Sync)) -> String {
    handle.downcast_ref::<String>().cloned().unwrap_or_default()
}
