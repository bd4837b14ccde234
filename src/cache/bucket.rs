//! Capacity-bounded container for the entries of one tag

use std::collections::{BTreeMap, HashMap};

use crate::eviction::EvictionPolicyType;
use crate::key::CacheKey;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    stamp: u64,
}

/// Entries sharing one tag, ordered by recency stamp (lowest = evicted first)
#[derive(Debug)]
pub struct TagBucket<V> {
    capacity: Option<usize>,
    policy: EvictionPolicyType,
    slots: HashMap<CacheKey, Slot<V>>,
    order: BTreeMap<u64, CacheKey>,
    clock: u64,
}

impl<V> TagBucket<V> {
    /// `None` capacity means unbounded
    pub fn new(capacity: Option<usize>, policy: EvictionPolicyType) -> Self {
        Self {
            capacity,
            policy,
            slots: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Insert or update `key`, then evict until the bucket fits its capacity
    ///
    /// Returns the evicted entries, oldest first. The key just written is
    /// only ever evicted when the capacity is 0.
    pub fn put(&mut self, key: CacheKey, value: V) -> Vec<(CacheKey, V)> {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.value = value;
            if self.policy.policy().refresh_on_write() {
                self.clock += 1;
                self.order.remove(&slot.stamp);
                slot.stamp = self.clock;
                self.order.insert(self.clock, key);
            }
            return Vec::new();
        }

        self.clock += 1;
        let stamp = self.clock;
        self.order.insert(stamp, key.clone());
        self.slots.insert(key.clone(), Slot { value, stamp });

        self.evict_over_capacity(&key)
    }

    /// Read `key`; under LRU this counts as a use
    pub fn get(&mut self, key: &CacheKey) -> Option<&V> {
        if self.policy.policy().refresh_on_read() {
            let slot = self.slots.get_mut(key)?;
            self.clock += 1;
            self.order.remove(&slot.stamp);
            slot.stamp = self.clock;
            self.order.insert(self.clock, key.clone());
            Some(&slot.value)
        } else {
            self.slots.get(key).map(|slot| &slot.value)
        }
    }

    /// Delete `key`; no-op if absent
    pub fn remove(&mut self, key: &CacheKey) -> Option<V> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot.stamp);
        Some(slot.value)
    }

    /// Contained keys, least recently used first
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> + '_ {
        self.order.values()
    }

    /// Contained entries, least recently used first
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &V)> + '_ {
        let slots = &self.slots;
        self.order
            .values()
            .filter_map(move |key| slots.get(key).map(|slot| (key, &slot.value)))
    }

    /// Consume the bucket, yielding entries least recently used first
    pub fn into_entries(self) -> Vec<(CacheKey, V)> {
        let mut slots = self.slots;
        self.order
            .into_values()
            .filter_map(|key| slots.remove(&key).map(|slot| (key, slot.value)))
            .collect()
    }

    fn evict_over_capacity(&mut self, protect: &CacheKey) -> Vec<(CacheKey, V)> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        while self.slots.len() > capacity {
            let victim = match self.order.values().find(|key| *key != protect) {
                Some(key) => key.clone(),
                // Only the protected key is left, which means capacity is 0
                None => protect.clone(),
            };
            match self.remove(&victim) {
                Some(value) => evicted.push((victim, value)),
                None => break,
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::from(name)
    }

    fn keys_of<V>(bucket: &TagBucket<V>) -> Vec<String> {
        bucket.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_unbounded_bucket_never_evicts() {
        let mut bucket = TagBucket::new(None, EvictionPolicyType::Lru);
        for i in 0..100u64 {
            assert!(bucket.put(CacheKey::from(i), i).is_empty());
        }
        assert_eq!(bucket.len(), 100);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let mut bucket = TagBucket::new(Some(2), EvictionPolicyType::Lru);
        bucket.put(key("a"), 1);
        bucket.put(key("b"), 2);

        // Reading "a" makes "b" the eviction candidate
        assert_eq!(bucket.get(&key("a")), Some(&1));

        let evicted = bucket.put(key("c"), 3);
        assert_eq!(evicted, vec![(key("b"), 2)]);
        assert_eq!(keys_of(&bucket), vec!["a", "c"]);
    }

    #[test]
    fn test_lru_update_refreshes_recency() {
        let mut bucket = TagBucket::new(Some(2), EvictionPolicyType::Lru);
        bucket.put(key("a"), 1);
        bucket.put(key("b"), 2);
        assert!(bucket.put(key("a"), 10).is_empty());

        let evicted = bucket.put(key("c"), 3);
        assert_eq!(evicted, vec![(key("b"), 2)]);
        assert_eq!(bucket.get(&key("a")), Some(&10));
    }

    #[test]
    fn test_fifo_ignores_reads() {
        let mut bucket = TagBucket::new(Some(2), EvictionPolicyType::Fifo);
        bucket.put(key("a"), 1);
        bucket.put(key("b"), 2);
        bucket.get(&key("a"));

        let evicted = bucket.put(key("c"), 3);
        assert_eq!(evicted, vec![(key("a"), 1)]);
    }

    #[test]
    fn test_just_inserted_key_survives() {
        let mut bucket = TagBucket::new(Some(1), EvictionPolicyType::Lru);
        bucket.put(key("a"), 1);
        let evicted = bucket.put(key("b"), 2);

        assert_eq!(evicted, vec![(key("a"), 1)]);
        assert!(bucket.contains(&key("b")));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut bucket = TagBucket::new(Some(0), EvictionPolicyType::Lru);
        let evicted = bucket.put(key("a"), 1);

        assert_eq!(evicted, vec![(key("a"), 1)]);
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut bucket = TagBucket::new(Some(3), EvictionPolicyType::Lru);
        bucket.put(key("a"), 1);

        assert_eq!(bucket.remove(&key("a")), Some(1));
        assert_eq!(bucket.remove(&key("a")), None);
        assert!(bucket.is_empty());
        assert_eq!(bucket.keys().count(), 0);
    }

    #[test]
    fn test_into_entries_preserves_order() {
        let mut bucket = TagBucket::new(None, EvictionPolicyType::Lru);
        bucket.put(key("a"), 1);
        bucket.put(key("b"), 2);
        bucket.put(key("c"), 3);
        bucket.get(&key("a"));

        let entries: Vec<_> = bucket
            .into_entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("b".to_string(), 2),
                ("c".to_string(), 3),
                ("a".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_capacity_invariant_holds_under_churn() {
        let mut bucket = TagBucket::new(Some(3), EvictionPolicyType::Lru);
        for i in 0..50u64 {
            bucket.put(CacheKey::from(i % 7), i);
            if i % 3 == 0 {
                bucket.get(&CacheKey::from((i + 1) % 7));
            }
            assert!(bucket.len() <= 3);
        }
    }
}
