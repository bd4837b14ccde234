//! Node operations exposed to the graph host
//!
//! A [`Backend`] is the one shared cache of a host process. Every node
//! operation takes its lock for the whole call, so a `put` or `reconfigure`
//! is never observed half done.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

mod artifact;
mod loaders;

pub use artifact::{handle, tags, Artifact, Checkpoint, Handle, UnclipCheckpoint};
pub use loaders::{CascadeCacheMode, CascadeModels, ResourceLoader, SharedLoad, SharedLoader};

use crate::cache::{report, Payload, TagSettings, TaggedCache};
use crate::error::Result;
use crate::eviction::EvictionPolicyType;
use crate::key::CacheKey;
use crate::logging::{operations, services, status};
use crate::revision::Fingerprint;

pub struct Backend {
    cache: Mutex<TaggedCache<Artifact>>,
}

impl Backend {
    pub fn new(settings: TagSettings, policy: EvictionPolicyType) -> Self {
        Self {
            cache: Mutex::new(TaggedCache::with_policy(settings, policy)),
        }
    }

    /// Start from persisted settings; unreadable settings mean no limits
    pub fn from_settings_file<P: AsRef<Path>>(path: P, policy: EvictionPolicyType) -> Self {
        Self::new(TagSettings::load_or_default(path), policy)
    }

    /// Exclusive access to the underlying cache
    pub fn lock(&self) -> MutexGuard<'_, TaggedCache<Artifact>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store one value and pass it through
    pub fn cache_data(&self, key: CacheKey, tag: &str, data: Artifact) -> Artifact {
        self.store(key, tag, Payload::Single(data.clone()));
        data
    }

    /// Store a list of values and pass it through
    pub fn cache_data_list(&self, key: CacheKey, tag: &str, data: Vec<Artifact>) -> Vec<Artifact> {
        self.store(key, tag, Payload::List(data.clone()));
        data
    }

    fn store(&self, key: CacheKey, tag: &str, payload: Payload<Artifact>) {
        let is_list = payload.is_list();
        // A reserved key is logged by the cache and dropped; data still flows downstream
        if let Ok(revision) = self.lock().put(key.clone(), tag, payload) {
            debug!(
                service = services::NODE,
                operation = operations::PUT,
                key = %key,
                tag,
                is_list,
                revision,
                "data cached"
            );
        }
    }

    /// Cached values as a list, `None` for an unknown key
    pub fn retrieve(&self, key: &CacheKey) -> Option<Vec<Artifact>> {
        match self.lock().get(key) {
            Some(entry) => Some(entry.payload.to_list()),
            None => {
                info!(
                    service = services::NODE,
                    operation = operations::GET,
                    status = status::MISS,
                    key = %key,
                    "[RetrieveBackendData] '{}' is unregistered key.",
                    key
                );
                None
            }
        }
    }

    pub fn retrieve_fingerprint(&self, key: &CacheKey) -> Fingerprint {
        self.lock().fingerprint(key)
    }

    /// Delete one key, or everything for the text key `"*"`
    pub fn remove(&self, key: &CacheKey) {
        let mut cache = self.lock();
        if key.is_reserved() {
            cache.clear_all();
        } else if cache.delete(key).is_none() {
            info!(
                service = services::NODE,
                operation = operations::DELETE,
                status = status::MISS,
                key = %key,
                "RemoveBackendData: invalid data key {}",
                key
            );
        }
    }

    /// Text report of entries and tag settings
    pub fn show_cached_info(&self) -> String {
        report::render(&*self.lock())
    }

    /// The report node re-runs on every pass
    pub fn show_cached_info_fingerprint(&self) -> Fingerprint {
        Fingerprint::Volatile
    }

    /// Apply the settings section of an edited report
    ///
    /// Returns whether the settings changed. A malformed section is an
    /// error and leaves the cache untouched.
    pub fn apply_cache_info(&self, text: &str) -> Result<bool> {
        let settings = report::parse_settings(text)?;
        Ok(self.lock().reconfigure(settings))
    }
}
