//! Per-key revision tracking and change-detection fingerprints
//!
//! A revision counts writes to a key: 0 on the first write, +1 on each
//! later write. Revisions outlive deletion, eviction and clear-all, so the
//! tracker has no removal operation.

use serde::Serialize;
use std::collections::HashMap;

use crate::key::CacheKey;

/// Number of writes to a key minus one
pub type Revision = u64;

/// Weak change token handed to the external scheduler
///
/// Never derived from payload contents. `Volatile` is never equal to
/// anything, itself included.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fingerprint {
    /// Key paired with its current revision
    Weak { key: CacheKey, revision: Revision },
    /// Selected resource paired with the resolved key (override-mode loaders)
    Selection { resource: String, key: CacheKey },
    /// Always considered changed
    Volatile,
}

impl Fingerprint {
    /// Scheduler comparison: true only when a re-run can be skipped
    pub fn is_unchanged_since(&self, previous: &Fingerprint) -> bool {
        self == previous
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Weak { key, revision },
                Self::Weak {
                    key: other_key,
                    revision: other_revision,
                },
            ) => key == other_key && revision == other_revision,
            (
                Self::Selection { resource, key },
                Self::Selection {
                    resource: other_resource,
                    key: other_key,
                },
            ) => resource == other_resource && key == other_key,
            _ => false,
        }
    }
}

/// Immortal key -> write count map
#[derive(Debug, Default)]
pub struct RevisionTracker {
    counts: HashMap<CacheKey, Revision>,
}

impl RevisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one logical write and return the key's new revision
    pub fn record_write(&mut self, key: &CacheKey) -> Revision {
        match self.counts.get_mut(key) {
            Some(revision) => {
                *revision += 1;
                *revision
            }
            None => {
                self.counts.insert(key.clone(), 0);
                0
            }
        }
    }

    /// Last recorded revision, `None` if the key was never written
    pub fn revision(&self, key: &CacheKey) -> Option<Revision> {
        self.counts.get(key).copied()
    }

    /// Weak fingerprint; an unwritten key reports revision 0
    pub fn fingerprint(&self, key: &CacheKey) -> Fingerprint {
        Fingerprint::Weak {
            key: key.clone(),
            revision: self.revision(key).unwrap_or(0),
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_write_starts_at_zero() {
        let mut tracker = RevisionTracker::new();
        let key = CacheKey::from("model a");

        assert_eq!(tracker.revision(&key), None);
        assert_eq!(tracker.record_write(&key), 0);
        assert_eq!(tracker.record_write(&key), 1);
        assert_eq!(tracker.record_write(&key), 2);
        assert_eq!(tracker.revision(&key), Some(2));
    }

    #[test]
    fn test_keys_are_tracked_independently() {
        let mut tracker = RevisionTracker::new();
        tracker.record_write(&CacheKey::from("7"));
        tracker.record_write(&CacheKey::from("7"));

        assert_eq!(tracker.record_write(&CacheKey::from(7u64)), 0);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_fingerprint_of_unwritten_key() {
        let tracker = RevisionTracker::new();
        let fp = tracker.fingerprint(&CacheKey::from("never"));
        assert_eq!(
            fp,
            Fingerprint::Weak {
                key: CacheKey::from("never"),
                revision: 0
            }
        );
    }

    #[test]
    fn test_fingerprint_changes_only_on_write() {
        let mut tracker = RevisionTracker::new();
        let key = CacheKey::from(3u64);
        tracker.record_write(&key);

        let before = tracker.fingerprint(&key);
        assert!(tracker.fingerprint(&key).is_unchanged_since(&before));

        tracker.record_write(&key);
        assert!(!tracker.fingerprint(&key).is_unchanged_since(&before));
    }

    #[test]
    fn test_volatile_is_never_unchanged() {
        let fp = Fingerprint::Volatile;
        assert!(!fp.is_unchanged_since(&Fingerprint::Volatile));
        assert_ne!(fp, fp.clone());
    }

    #[test]
    fn test_selection_fingerprint_tracks_resource() {
        let a = Fingerprint::Selection {
            resource: "sd15.safetensors".to_string(),
            key: CacheKey::from("base"),
        };
        let b = Fingerprint::Selection {
            resource: "sdxl.safetensors".to_string(),
            key: CacheKey::from("base"),
        };
        assert!(a.is_unchanged_since(&a.clone()));
        assert!(!b.is_unchanged_since(&a));
    }
}
