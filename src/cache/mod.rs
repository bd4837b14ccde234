//! Tagged, capacity-bounded cache
//!
//! One flat key namespace, partitioned internally by tag. Each tag owns a
//! [`TagBucket`] whose capacity comes from [`TagSettings`]; tags without a
//! configured capacity are unbounded.
//!
//! ## Invariants
//!
//! - A key lives in at most one bucket; re-tagging moves it.
//! - A bounded bucket never holds more than its capacity. Eviction happens
//!   inside the write that would overflow it.
//! - Revisions are recorded for every successful `put` and are never reset,
//!   not by `delete`, `clear_all`, eviction or `reconfigure`.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

mod bucket;
mod entry;
pub mod report;
mod settings;

pub use bucket::TagBucket;
pub use entry::{Entry, Payload};
pub use settings::TagSettings;

use crate::error::{BackendError, Result};
use crate::eviction::{EvictionPolicyType, EvictionStats};
use crate::key::CacheKey;
use crate::logging::{operations, services, status};
use crate::revision::{Fingerprint, Revision, RevisionTracker};

pub struct TaggedCache<V> {
    settings: TagSettings,
    policy: EvictionPolicyType,
    buckets: BTreeMap<String, TagBucket<Payload<V>>>,
    index: HashMap<CacheKey, String>,
    revisions: RevisionTracker,
    stats: EvictionStats,
}

impl<V> TaggedCache<V> {
    pub fn new(settings: TagSettings) -> Self {
        Self::with_policy(settings, EvictionPolicyType::default())
    }

    pub fn with_policy(settings: TagSettings, policy: EvictionPolicyType) -> Self {
        let buckets = build_buckets(&settings, policy);
        Self {
            settings,
            policy,
            buckets,
            index: HashMap::new(),
            revisions: RevisionTracker::new(),
            stats: EvictionStats::new(),
        }
    }

    /// Store `payload` under `key` in the bucket for `tag`
    ///
    /// Moves the key out of its previous bucket when the tag changed, may
    /// evict other keys of the same tag, and bumps the key's revision.
    pub fn put(&mut self, key: CacheKey, tag: &str, payload: Payload<V>) -> Result<Revision> {
        if key.is_reserved() {
            warn!(
                service = services::CACHE,
                operation = operations::PUT,
                status = status::REJECTED,
                key = %key,
                "'*' is a reserved key, entry not stored"
            );
            return Err(BackendError::ReservedKey);
        }

        if let Some(previous) = self.index.get(&key) {
            if previous != tag {
                if let Some(bucket) = self.buckets.get_mut(previous) {
                    bucket.remove(&key);
                }
                debug!(
                    service = services::CACHE,
                    operation = operations::PUT,
                    key = %key,
                    from = %previous,
                    to = tag,
                    "entry moved to another tag"
                );
            }
        }

        let capacity = self.settings.capacity(tag);
        let policy = self.policy;
        let bucket = self
            .buckets
            .entry(tag.to_string())
            .or_insert_with(|| TagBucket::new(capacity, policy));
        let evicted = bucket.put(key.clone(), payload);

        let mut retained = true;
        if !evicted.is_empty() {
            self.stats.record_run(evicted.len());
            for (evicted_key, _) in &evicted {
                if *evicted_key == key {
                    retained = false;
                } else {
                    self.index.remove(evicted_key);
                }
                debug!(
                    service = services::CACHE,
                    operation = operations::EVICT,
                    key = %evicted_key,
                    tag,
                    "entry evicted"
                );
            }
        }

        if retained {
            self.index.insert(key.clone(), tag.to_string());
        } else {
            self.index.remove(&key);
        }

        let revision = self.revisions.record_write(&key);
        debug!(
            service = services::CACHE,
            operation = operations::PUT,
            status = status::SUCCESS,
            key = %key,
            tag,
            revision,
            "entry stored"
        );
        Ok(revision)
    }

    /// Look up `key`, counting the read as a use for eviction order
    pub fn get(&mut self, key: &CacheKey) -> Option<Entry<V>>
    where
        V: Clone,
    {
        let tag = self.index.get(key)?;
        let payload = self.buckets.get_mut(tag)?.get(key)?.clone();
        Some(Entry {
            tag: tag.clone(),
            payload,
        })
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    /// Tag currently holding `key`
    pub fn tag_of(&self, key: &CacheKey) -> Option<&str> {
        self.index.get(key).map(String::as_str)
    }

    /// Remove `key`; no-op if absent. Revisions are untouched.
    pub fn delete(&mut self, key: &CacheKey) -> Option<Entry<V>> {
        if key.is_reserved() {
            info!(
                service = services::CACHE,
                operation = operations::DELETE,
                status = status::REJECTED,
                "'*' is not a concrete key, nothing removed"
            );
            return None;
        }

        let tag = self.index.remove(key)?;
        let payload = self.buckets.get_mut(&tag)?.remove(key)?;
        debug!(
            service = services::CACHE,
            operation = operations::DELETE,
            status = status::SUCCESS,
            key = %key,
            tag = %tag,
            "entry removed"
        );
        Some(Entry { tag, payload })
    }

    /// Drop every entry and start over with empty buckets; revisions survive
    pub fn clear_all(&mut self) {
        let dropped = self.index.len();
        self.buckets = build_buckets(&self.settings, self.policy);
        self.index.clear();
        info!(
            service = services::CACHE,
            operation = operations::CLEAR,
            status = status::SUCCESS,
            entries = dropped,
            "cache cleared"
        );
    }

    /// Replace the tag capacities, re-partitioning held entries
    ///
    /// Returns `false` without touching anything when `settings` equals the
    /// current mapping. Otherwise every entry is re-inserted in recency
    /// order, so shrunk buckets keep their most recently used keys.
    pub fn reconfigure(&mut self, settings: TagSettings) -> bool {
        if settings == self.settings {
            debug!(
                service = services::CACHE,
                operation = operations::RECONFIGURE,
                "tag settings unchanged"
            );
            return false;
        }

        let policy = self.policy;
        let old = std::mem::replace(&mut self.buckets, build_buckets(&settings, policy));
        self.settings = settings;
        self.index.clear();

        let mut evicted_total = 0;
        for (tag, bucket) in old {
            let capacity = self.settings.capacity(&tag);
            let target = self
                .buckets
                .entry(tag.clone())
                .or_insert_with(|| TagBucket::new(capacity, policy));

            for (key, payload) in bucket.into_entries() {
                let evicted = target.put(key.clone(), payload);
                self.index.insert(key, tag.clone());
                for (evicted_key, _) in evicted {
                    self.index.remove(&evicted_key);
                    evicted_total += 1;
                }
            }
        }

        if evicted_total > 0 {
            self.stats.record_run(evicted_total);
        }
        info!(
            service = services::CACHE,
            operation = operations::RECONFIGURE,
            status = status::SUCCESS,
            tags = self.settings.len(),
            evicted = evicted_total,
            "tag settings replaced"
        );
        true
    }

    /// Every held entry as `(key, tag, payload)`, grouped by tag
    pub fn items(&self) -> impl Iterator<Item = (&CacheKey, &str, &Payload<V>)> + '_ {
        self.buckets.iter().flat_map(|(tag, bucket)| {
            bucket
                .iter()
                .map(move |(key, payload)| (key, tag.as_str(), payload))
        })
    }

    /// Buckets by tag, including empty and unconfigured ones
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &TagBucket<Payload<V>>)> + '_ {
        self.buckets
            .iter()
            .map(|(tag, bucket)| (tag.as_str(), bucket))
    }

    pub fn fingerprint(&self, key: &CacheKey) -> Fingerprint {
        self.revisions.fingerprint(key)
    }

    pub fn revision(&self, key: &CacheKey) -> Option<Revision> {
        self.revisions.revision(key)
    }

    pub fn settings(&self) -> &TagSettings {
        &self.settings
    }

    pub fn policy(&self) -> EvictionPolicyType {
        self.policy
    }

    pub fn stats(&self) -> &EvictionStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn build_buckets<V>(
    settings: &TagSettings,
    policy: EvictionPolicyType,
) -> BTreeMap<String, TagBucket<Payload<V>>> {
    settings
        .iter()
        .map(|(tag, capacity)| (tag.to_string(), TagBucket::new(Some(capacity), policy)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, usize)]) -> TagSettings {
        pairs
            .iter()
            .map(|(tag, capacity)| (tag.to_string(), *capacity))
            .collect()
    }

    fn single(value: &'static str) -> Payload<&'static str> {
        Payload::Single(value)
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from(name)
    }

    #[test]
    fn test_put_and_get() {
        let mut cache = TaggedCache::new(TagSettings::new());
        assert_eq!(cache.put(key("a"), "latent", single("v1")).unwrap(), 0);

        let entry = cache.get(&key("a")).unwrap();
        assert_eq!(entry.tag, "latent");
        assert_eq!(entry.payload, single("v1"));
        assert!(cache.get(&key("missing")).is_none());
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let mut cache = TaggedCache::new(settings(&[("ckpt", 1)]));
        cache.put(key("A"), "ckpt", single("v1")).unwrap();
        cache.put(key("B"), "ckpt", single("v2")).unwrap();

        assert!(cache.get(&key("A")).is_none());
        assert!(!cache.contains(&key("A")));
        assert_eq!(cache.get(&key("B")).unwrap().payload, single("v2"));
        assert_eq!(cache.stats().get_evictions_total(), 1);
    }

    #[test]
    fn test_retagging_moves_entry() {
        let mut cache = TaggedCache::new(settings(&[("ckpt", 1)]));
        cache.put(key("A"), "ckpt", single("v1")).unwrap();
        cache.put(key("A"), "latent", single("v2")).unwrap();

        // "A" left the ckpt bucket, so "B" evicts nothing
        cache.put(key("B"), "ckpt", single("v3")).unwrap();
        assert_eq!(cache.tag_of(&key("A")), Some("latent"));
        assert_eq!(cache.len(), 2);

        let holders: Vec<_> = cache
            .buckets()
            .filter(|(_, bucket)| bucket.contains(&key("A")))
            .map(|(tag, _)| tag.to_string())
            .collect();
        assert_eq!(holders, vec!["latent"]);
    }

    #[test]
    fn test_namespace_separation() {
        let mut cache = TaggedCache::new(TagSettings::new());
        cache.put(CacheKey::from("7"), "t", single("text")).unwrap();
        cache.put(CacheKey::from(7u64), "t", single("number")).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get(&CacheKey::from("7")).unwrap().payload,
            single("text")
        );
        assert_eq!(
            cache.get(&CacheKey::from(7u64)).unwrap().payload,
            single("number")
        );
    }

    #[test]
    fn test_reserved_key_rejected() {
        let mut cache = TaggedCache::new(TagSettings::new());
        let result = cache.put(key("*"), "t", single("v"));

        assert!(matches!(result, Err(BackendError::ReservedKey)));
        assert!(cache.get(&key("*")).is_none());
        assert_eq!(cache.revision(&key("*")), None);
        assert!(cache.delete(&key("*")).is_none());
    }

    #[test]
    fn test_revisions_survive_delete_and_clear() {
        let mut cache = TaggedCache::new(TagSettings::new());
        assert_eq!(cache.put(key("X"), "t", single("v")).unwrap(), 0);

        cache.clear_all();
        assert!(cache.is_empty());
        assert_eq!(cache.put(key("X"), "t", single("v2")).unwrap(), 1);

        cache.delete(&key("X"));
        assert_eq!(cache.revision(&key("X")), Some(1));
        assert_eq!(cache.put(key("X"), "t", single("v3")).unwrap(), 2);
    }

    #[test]
    fn test_eviction_does_not_touch_revision() {
        let mut cache = TaggedCache::new(settings(&[("ckpt", 1)]));
        cache.put(key("A"), "ckpt", single("v1")).unwrap();
        cache.put(key("B"), "ckpt", single("v2")).unwrap();

        assert_eq!(
            cache.fingerprint(&key("A")),
            Fingerprint::Weak {
                key: key("A"),
                revision: 0
            }
        );
    }

    #[test]
    fn test_clear_all_keeps_settings() {
        let mut cache = TaggedCache::new(settings(&[("ckpt", 1)]));
        cache.put(key("A"), "ckpt", single("v1")).unwrap();
        cache.clear_all();

        cache.put(key("B"), "ckpt", single("v2")).unwrap();
        cache.put(key("C"), "ckpt", single("v3")).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut cache: TaggedCache<&str> = TaggedCache::new(TagSettings::new());
        assert!(cache.delete(&key("nope")).is_none());
        assert!(cache.delete(&CacheKey::from(3u64)).is_none());
    }

    #[test]
    fn test_reconfigure_identical_is_noop() {
        let mut cache = TaggedCache::new(settings(&[("ckpt", 3)]));
        cache.put(key("a"), "ckpt", single("1")).unwrap();
        cache.put(key("b"), "ckpt", single("2")).unwrap();
        cache.get(&key("a"));

        let before: Vec<_> = cache.items().map(|(k, _, _)| k.clone()).collect();
        assert!(!cache.reconfigure(settings(&[("ckpt", 3)])));
        let after: Vec<_> = cache.items().map(|(k, _, _)| k.clone()).collect();

        assert_eq!(before, after);
        assert_eq!(after, vec![key("b"), key("a")]);
    }

    #[test]
    fn test_reconfigure_shrink_keeps_most_recent() {
        let mut cache = TaggedCache::new(TagSettings::new());
        for name in ["a", "b", "c", "d"] {
            cache.put(key(name), "ckpt", single(name)).unwrap();
        }
        cache.get(&key("a"));

        assert!(cache.reconfigure(settings(&[("ckpt", 2)])));

        let mut kept: Vec<_> = cache.items().map(|(k, _, _)| k.to_string()).collect();
        kept.sort();
        assert_eq!(kept, vec!["a", "d"]);
        assert!(!cache.contains(&key("b")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reconfigure_does_not_bump_revisions() {
        let mut cache = TaggedCache::new(TagSettings::new());
        cache.put(key("a"), "t", single("1")).unwrap();

        cache.reconfigure(settings(&[("t", 5)]));
        assert_eq!(cache.revision(&key("a")), Some(0));
    }

    #[test]
    fn test_reconfigure_unlisted_tags_become_unbounded() {
        let mut cache = TaggedCache::new(settings(&[("ckpt", 1)]));
        cache.put(key("a"), "ckpt", single("1")).unwrap();

        cache.reconfigure(settings(&[("other", 1)]));
        cache.put(key("b"), "ckpt", single("2")).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_tag_stores_nothing() {
        let mut cache = TaggedCache::new(settings(&[("off", 0)]));
        assert_eq!(cache.put(key("a"), "off", single("1")).unwrap(), 0);

        assert!(!cache.contains(&key("a")));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.revision(&key("a")), Some(0));
    }

    #[test]
    fn test_list_payload_roundtrip() {
        let mut cache = TaggedCache::new(TagSettings::new());
        cache
            .put(key("batch"), "img", Payload::List(vec!["x", "y"]))
            .unwrap();

        let entry = cache.get(&key("batch")).unwrap();
        assert!(entry.payload.is_list());
        assert_eq!(entry.payload.to_list(), vec!["x", "y"]);
    }

    #[test]
    fn test_capacity_invariant_retains_most_recent() {
        let mut cache = TaggedCache::new(settings(&[("t", 3)]));
        let names = ["a", "b", "c", "d", "e", "f"];
        for name in names {
            cache.put(key(name), "t", single(name)).unwrap();
            let (_, bucket) = cache.buckets().find(|(tag, _)| *tag == "t").unwrap();
            assert!(bucket.len() <= 3);
        }
        cache.get(&key("d"));
        cache.put(key("g"), "t", single("g")).unwrap();

        let mut kept: Vec<_> = cache.items().map(|(k, _, _)| k.to_string()).collect();
        kept.sort();
        assert_eq!(kept, vec!["d", "f", "g"]);
    }
}
