use thiserror::Error;

use crate::key::CacheKey;

/// Errors surfaced by the cache and the node operations built on it
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("'*' is a reserved key and cannot be used to store data")]
    ReservedKey,

    #[error("[{node}] {field} cannot be omitted if mode is 'Read Only'")]
    BlankKey {
        node: &'static str,
        field: &'static str,
    },

    #[error("[{node}] unexpected cache kind '{tag}' stored under '{key}'")]
    ShapeMismatch {
        node: &'static str,
        key: CacheKey,
        tag: String,
    },

    #[error("invalid cache settings line {line}: {reason}")]
    Settings { line: usize, reason: String },

    #[error("invalid load mode '{0}'. Must be 'Auto', 'Override Cache' or 'Read Only'")]
    InvalidMode(String),

    #[error("failed to load '{resource}'")]
    Loader {
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    pub fn loader(resource: &str, source: anyhow::Error) -> Self {
        Self::Loader {
            resource: resource.to_string(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = BackendError> = std::result::Result<T, E>;
