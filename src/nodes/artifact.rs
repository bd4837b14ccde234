//! Payload shapes held by the node-facing cache
//!
//! Loader nodes match on these variants instead of on tag strings, so a
//! checkpoint bundle can never be unpacked as a control net by accident.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque host object (model weights, tensors, latents, ...)
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Wrap a host value as a [`Handle`]
pub fn handle<T: Any + Send + Sync>(value: T) -> Handle {
    Arc::new(value)
}

/// Tags the shared loaders store their results under
pub mod tags {
    pub const CKPT: &str = "ckpt";
    pub const UNCLIP_CKPT: &str = "unclip_ckpt";
    pub const UPSCALE_MODEL: &str = "model";
    pub const CONTROLNET: &str = "controlnet";
    pub const CLIP_VISION: &str = "clip";
}

/// Model, text encoder and VAE loaded from one checkpoint file
#[derive(Clone)]
pub struct Checkpoint {
    pub model: Handle,
    pub clip: Handle,
    pub vae: Handle,
}

/// Checkpoint that also carries a vision encoder
#[derive(Clone)]
pub struct UnclipCheckpoint {
    pub model: Handle,
    pub clip: Handle,
    pub vae: Handle,
    pub clip_vision: Handle,
}

impl UnclipCheckpoint {
    /// Drop the vision encoder
    pub fn into_checkpoint(self) -> Checkpoint {
        Checkpoint {
            model: self.model,
            clip: self.clip,
            vae: self.vae,
        }
    }
}

#[derive(Clone)]
pub enum Artifact {
    /// Anything a data node was given
    Data(Handle),
    Checkpoint(Checkpoint),
    UnclipCheckpoint(UnclipCheckpoint),
    UpscaleModel(Handle),
    ControlNet(Handle),
    ClipVision(Handle),
}

impl Artifact {
    pub fn data<T: Any + Send + Sync>(value: T) -> Self {
        Self::Data(handle(value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Checkpoint(_) => tags::CKPT,
            Self::UnclipCheckpoint(_) => tags::UNCLIP_CKPT,
            Self::UpscaleModel(_) => tags::UPSCALE_MODEL,
            Self::ControlNet(_) => tags::CONTROLNET,
            Self::ClipVision(_) => tags::CLIP_VISION,
        }
    }

    /// Downcast a `Data` artifact
    pub fn downcast_data<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Data(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Artifact::{}", self.kind())
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint").finish_non_exhaustive()
    }
}

impl fmt::Debug for UnclipCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnclipCheckpoint").finish_non_exhaustive()
    }
}
