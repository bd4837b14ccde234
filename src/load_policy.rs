//! Load-or-reuse policy for shared loader nodes
//!
//! | mode             | key present         | key absent          |
//! |------------------|---------------------|---------------------|
//! | `Auto`           | reuse               | load and store      |
//! | `OverrideCache`  | load and overwrite  | load and store      |
//! | `ReadOnly`       | reuse               | load and store      |
//!
//! `ReadOnly` still populates the cache on a miss. Graphs in the wild rely
//! on that first-use population, so it is kept as is. It differs from `Auto`
//! only in requiring an explicit key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::cache::{Payload, TaggedCache};
use crate::error::{BackendError, Result};
use crate::key::CacheKey;
use crate::logging::{operations, services, status};
use crate::revision::{Fingerprint, Revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoadMode {
    #[default]
    Auto,
    OverrideCache,
    ReadOnly,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::OverrideCache => "Override Cache",
            Self::ReadOnly => "Read Only",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "auto" => Ok(Self::Auto),
            "override cache" => Ok(Self::OverrideCache),
            "read only" => Ok(Self::ReadOnly),
            _ => Err(BackendError::InvalidMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for LoadMode {
    type Error = BackendError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<LoadMode> for String {
    fn from(mode: LoadMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Loaded,
    Cached,
}

/// Outcome of [`resolve`]
#[derive(Debug, Clone)]
pub struct Resolved<V> {
    /// Tag the value is stored under; for cache hits this is the stored tag,
    /// which may differ from the one the caller declared
    pub tag: String,
    pub value: V,
    pub origin: Origin,
    /// Revision written by this call, `None` on reuse
    pub revision: Option<Revision>,
}

/// Pick the cache key for a loader node
///
/// A non-blank override wins; otherwise the resource name is the key. In
/// `ReadOnly` mode the override is mandatory.
pub fn resolve_key(
    node: &'static str,
    field: &'static str,
    key_opt: &str,
    resource_name: &str,
    mode: LoadMode,
) -> Result<CacheKey> {
    let key_opt = key_opt.trim();
    if !key_opt.is_empty() {
        return Ok(CacheKey::from(key_opt));
    }
    if mode == LoadMode::ReadOnly {
        return Err(BackendError::BlankKey { node, field });
    }
    Ok(CacheKey::from(resource_name))
}

/// Reuse the entry at `key` or call `loader` and store its result under `tag`
///
/// The loader runs at most once and only when needed. If it fails the cache
/// is left exactly as it was. The reserved key is refused before anything
/// is loaded.
pub fn resolve<V, F>(
    cache: &mut TaggedCache<V>,
    node: &'static str,
    key: &CacheKey,
    mode: LoadMode,
    tag: &str,
    resource: &str,
    loader: F,
) -> Result<Resolved<V>>
where
    V: Clone,
    F: FnOnce() -> anyhow::Result<V>,
{
    if key.is_reserved() {
        return Err(BackendError::ReservedKey);
    }
    if mode != LoadMode::OverrideCache {
        if let Some(entry) = cache.get(key) {
            let value = match entry.payload {
                Payload::Single(value) => value,
                Payload::List(_) => {
                    return Err(BackendError::ShapeMismatch {
                        node,
                        key: key.clone(),
                        tag: entry.tag,
                    })
                }
            };
            info!(
                service = services::LOADER,
                operation = operations::LOAD,
                status = status::REUSED,
                key = %key,
                tag = %entry.tag,
                "Cached '{}' is loaded (loading skipped)",
                key
            );
            return Ok(Resolved {
                tag: entry.tag,
                value,
                origin: Origin::Cached,
                revision: None,
            });
        }
    }

    let value = loader().map_err(|e| BackendError::loader(resource, e))?;
    let revision = cache.put(key.clone(), tag, Payload::Single(value.clone()))?;
    info!(
        service = services::LOADER,
        operation = operations::LOAD,
        status = status::SUCCESS,
        key = %key,
        tag,
        revision,
        "'{}' is cached to '{}'",
        resource,
        key
    );

    Ok(Resolved {
        tag: tag.to_string(),
        value,
        origin: Origin::Loaded,
        revision: Some(revision),
    })
}

/// Scheduler fingerprint for a loader node
///
/// Override mode reports the selection itself, so any change of resource
/// re-runs the node regardless of cache contents.
pub fn fingerprint<V>(
    cache: &TaggedCache<V>,
    resource: &str,
    key: &CacheKey,
    mode: LoadMode,
) -> Fingerprint {
    match mode {
        LoadMode::OverrideCache => Fingerprint::Selection {
            resource: resource.to_string(),
            key: key.clone(),
        },
        LoadMode::Auto | LoadMode::ReadOnly => cache.fingerprint(key),
    }
}
