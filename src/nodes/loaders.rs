//! Shared loader nodes
//!
//! Each loader resolves a cache key, then either reuses the cached resource
//! or calls the host's [`ResourceLoader`] and caches the result under its
//! tag. Cached resources are unpacked by shape; a shape the node cannot use
//! is a hard error.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::artifact::{tags, Artifact, Checkpoint, Handle, UnclipCheckpoint};
use super::Backend;
use crate::error::{BackendError, Result};
use crate::key::CacheKey;
use crate::load_policy::{self, resolve_key, LoadMode, Origin};
use crate::revision::Fingerprint;

const CASCADE_NODE: &str = "StableCascade_CheckpointLoader";

/// Host capability that actually reads resources from disk
///
/// Calls may be slow; the backend invokes each at most once per store.
/// The backend lock is held while a load runs, so an implementation must
/// not call back into the same [`Backend`]; doing so deadlocks.
pub trait ResourceLoader {
    fn load_checkpoint(&self, name: &str) -> anyhow::Result<Checkpoint>;

    fn load_unclip_checkpoint(&self, name: &str) -> anyhow::Result<UnclipCheckpoint>;

    fn load_upscale_model(&self, name: &str) -> anyhow::Result<Handle>;

    fn load_controlnet(&self, name: &str) -> anyhow::Result<Handle>;

    fn load_clip_vision(&self, name: &str) -> anyhow::Result<Handle>;
}

/// The single-resource shared loaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedLoader {
    Checkpoint,
    UpscaleModel,
    ControlNet,
    ClipVision,
}

impl SharedLoader {
    pub fn node(&self) -> &'static str {
        match self {
            Self::Checkpoint => "CheckpointLoaderSimpleShared",
            Self::UpscaleModel => "UpscaleLoaderSimpleShared",
            Self::ControlNet => "ControlnetLoaderSimpleShared",
            Self::ClipVision => "CLIPVisionLoaderSimpleShared",
        }
    }

    fn key_field(&self) -> &'static str {
        match self {
            Self::Checkpoint => "key_opt",
            Self::UpscaleModel => "key_opt_u",
            Self::ControlNet => "key_opt_cn",
            Self::ClipVision => "key_opt_cv",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Checkpoint => tags::CKPT,
            Self::UpscaleModel => tags::UPSCALE_MODEL,
            Self::ControlNet => tags::CONTROLNET,
            Self::ClipVision => tags::CLIP_VISION,
        }
    }

    fn load(&self, loader: &dyn ResourceLoader, name: &str) -> anyhow::Result<Artifact> {
        Ok(match self {
            Self::Checkpoint => Artifact::Checkpoint(loader.load_checkpoint(name)?),
            Self::UpscaleModel => Artifact::UpscaleModel(loader.load_upscale_model(name)?),
            Self::ControlNet => Artifact::ControlNet(loader.load_controlnet(name)?),
            Self::ClipVision => Artifact::ClipVision(loader.load_clip_vision(name)?),
        })
    }

    /// Whether a cached artifact can be read back by this loader
    fn accepts(&self, artifact: &Artifact) -> bool {
        matches!(
            (self, artifact),
            (Self::Checkpoint, Artifact::Checkpoint(_))
                | (Self::Checkpoint, Artifact::UnclipCheckpoint(_))
                | (Self::UpscaleModel, Artifact::UpscaleModel(_))
                | (Self::ControlNet, Artifact::ControlNet(_))
                | (Self::ClipVision, Artifact::ClipVision(_))
        )
    }
}

/// Result of a shared loader node
#[derive(Debug, Clone)]
pub struct SharedLoad {
    pub artifact: Artifact,
    /// Tag the artifact is stored under
    pub tag: String,
    /// Resolved cache key, also a node output
    pub key: CacheKey,
    pub origin: Origin,
}

impl SharedLoad {
    fn mismatch(self, node: &'static str) -> BackendError {
        BackendError::ShapeMismatch {
            node,
            key: self.key,
            tag: self.tag,
        }
    }
}

/// Which Stable Cascade stages go through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeCacheMode {
    #[default]
    None,
    StageB,
    StageC,
    All,
}

impl CascadeCacheMode {
    fn caches_stage_b(&self) -> bool {
        matches!(self, Self::StageB | Self::All)
    }

    fn caches_stage_c(&self) -> bool {
        matches!(self, Self::StageC | Self::All)
    }
}

impl FromStr for CascadeCacheMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "stage_b" => Ok(Self::StageB),
            "stage_c" => Ok(Self::StageC),
            "all" => Ok(Self::All),
            _ => anyhow::bail!(
                "Invalid cascade cache mode: {}. Must be none, stage_b, stage_c or all",
                s
            ),
        }
    }
}

/// Outputs of the Stable Cascade loader
#[derive(Clone, Debug)]
pub struct CascadeModels {
    pub b_model: Handle,
    pub b_vae: Handle,
    pub c_model: Handle,
    pub c_vae: Handle,
    pub c_clip_vision: Handle,
    pub clip: Handle,
    pub key_b: CacheKey,
    pub key_c: CacheKey,
}

impl Backend {
    /// Load-or-reuse for one of the shared loaders
    pub fn load_shared(
        &self,
        kind: SharedLoader,
        loader: &dyn ResourceLoader,
        resource: &str,
        key_opt: &str,
        mode: LoadMode,
    ) -> Result<SharedLoad> {
        let key = resolve_key(kind.node(), kind.key_field(), key_opt, resource, mode)?;

        let resolved = {
            let mut cache = self.lock();
            load_policy::resolve(
                &mut *cache,
                kind.node(),
                &key,
                mode,
                kind.tag(),
                resource,
                || kind.load(loader, resource),
            )?
        };

        let loaded = SharedLoad {
            artifact: resolved.value,
            tag: resolved.tag,
            key,
            origin: resolved.origin,
        };
        if !kind.accepts(&loaded.artifact) {
            return Err(loaded.mismatch(kind.node()));
        }
        Ok(loaded)
    }

    /// Scheduler fingerprint for a shared loader node
    pub fn shared_fingerprint(
        &self,
        kind: SharedLoader,
        resource: &str,
        key_opt: &str,
        mode: LoadMode,
    ) -> Result<Fingerprint> {
        let key = resolve_key(kind.node(), kind.key_field(), key_opt, resource, mode)?;
        Ok(load_policy::fingerprint(&*self.lock(), resource, &key, mode))
    }

    pub fn load_checkpoint(
        &self,
        loader: &dyn ResourceLoader,
        ckpt_name: &str,
        key_opt: &str,
        mode: LoadMode,
    ) -> Result<(Checkpoint, CacheKey)> {
        let kind = SharedLoader::Checkpoint;
        let loaded = self.load_shared(kind, loader, ckpt_name, key_opt, mode)?;
        match loaded.artifact {
            Artifact::Checkpoint(checkpoint) => Ok((checkpoint, loaded.key)),
            Artifact::UnclipCheckpoint(bundle) => Ok((bundle.into_checkpoint(), loaded.key)),
            _ => Err(loaded.mismatch(kind.node())),
        }
    }

    pub fn load_upscale_model(
        &self,
        loader: &dyn ResourceLoader,
        model_name: &str,
        key_opt: &str,
        mode: LoadMode,
    ) -> Result<(Handle, CacheKey)> {
        let kind = SharedLoader::UpscaleModel;
        let loaded = self.load_shared(kind, loader, model_name, key_opt, mode)?;
        match loaded.artifact {
            Artifact::UpscaleModel(model) => Ok((model, loaded.key)),
            _ => Err(loaded.mismatch(kind.node())),
        }
    }

    pub fn load_controlnet(
        &self,
        loader: &dyn ResourceLoader,
        control_net_name: &str,
        key_opt: &str,
        mode: LoadMode,
    ) -> Result<(Handle, CacheKey)> {
        let kind = SharedLoader::ControlNet;
        let loaded = self.load_shared(kind, loader, control_net_name, key_opt, mode)?;
        match loaded.artifact {
            Artifact::ControlNet(model) => Ok((model, loaded.key)),
            _ => Err(loaded.mismatch(kind.node())),
        }
    }

    pub fn load_clip_vision(
        &self,
        loader: &dyn ResourceLoader,
        clip_name: &str,
        key_opt: &str,
        mode: LoadMode,
    ) -> Result<(Handle, CacheKey)> {
        let kind = SharedLoader::ClipVision;
        let loaded = self.load_shared(kind, loader, clip_name, key_opt, mode)?;
        match loaded.artifact {
            Artifact::ClipVision(model) => Ok((model, loaded.key)),
            _ => Err(loaded.mismatch(kind.node())),
        }
    }

    /// Stable Cascade loader: stage B is a plain checkpoint, stage C an unCLIP bundle
    ///
    /// Stages selected by `cache_mode` are reused when cached and cached when
    /// loaded; the others are loaded directly every time.
    pub fn load_stable_cascade(
        &self,
        loader: &dyn ResourceLoader,
        stage_b: &str,
        key_opt_b: &str,
        stage_c: &str,
        key_opt_c: &str,
        cache_mode: CascadeCacheMode,
    ) -> Result<CascadeModels> {
        let key_b = resolve_key(CASCADE_NODE, "key_opt_b", key_opt_b, stage_b, LoadMode::Auto)?;
        let key_c = resolve_key(CASCADE_NODE, "key_opt_c", key_opt_c, stage_c, LoadMode::Auto)?;
        if (cache_mode.caches_stage_b() && key_b.is_reserved())
            || (cache_mode.caches_stage_c() && key_c.is_reserved())
        {
            return Err(BackendError::ReservedKey);
        }

        let b = if cache_mode.caches_stage_b() {
            let resolved = {
                let mut cache = self.lock();
                load_policy::resolve(
                    &mut *cache,
                    CASCADE_NODE,
                    &key_b,
                    LoadMode::Auto,
                    tags::CKPT,
                    stage_b,
                    || loader.load_checkpoint(stage_b).map(Artifact::Checkpoint),
                )?
            };
            match resolved.value {
                Artifact::Checkpoint(checkpoint) => checkpoint,
                Artifact::UnclipCheckpoint(bundle) => bundle.into_checkpoint(),
                _ => {
                    return Err(BackendError::ShapeMismatch {
                        node: CASCADE_NODE,
                        key: key_b,
                        tag: resolved.tag,
                    })
                }
            }
        } else {
            loader
                .load_checkpoint(stage_b)
                .map_err(|e| BackendError::loader(stage_b, e))?
        };

        let c = if cache_mode.caches_stage_c() {
            let resolved = {
                let mut cache = self.lock();
                load_policy::resolve(
                    &mut *cache,
                    CASCADE_NODE,
                    &key_c,
                    LoadMode::Auto,
                    tags::UNCLIP_CKPT,
                    stage_c,
                    || {
                        loader
                            .load_unclip_checkpoint(stage_c)
                            .map(Artifact::UnclipCheckpoint)
                    },
                )?
            };
            match resolved.value {
                Artifact::UnclipCheckpoint(bundle) => bundle,
                _ => {
                    return Err(BackendError::ShapeMismatch {
                        node: CASCADE_NODE,
                        key: key_c,
                        tag: resolved.tag,
                    })
                }
            }
        } else {
            loader
                .load_unclip_checkpoint(stage_c)
                .map_err(|e| BackendError::loader(stage_c, e))?
        };

        Ok(CascadeModels {
            b_model: b.model,
            b_vae: b.vae,
            c_model: c.model,
            c_vae: c.vae,
            c_clip_vision: c.clip_vision,
            clip: b.clip,
            key_b,
            key_c,
        })
    }
}
