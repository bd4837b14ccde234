//! Bucket eviction
//!
//! Every tag bucket with a configured capacity evicts synchronously, inside
//! the write that pushes it over capacity. Two orderings are available:
//! - **LRU** (Least Recently Used): reads and updates refresh an entry
//! - **FIFO** (First In, First Out): only the first insertion counts
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! eviction_policy = "lru"  # lru or fifo
//! ```

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};

mod policy;

pub use policy::{EvictionPolicy, FifoPolicy, LruPolicy};

/// Eviction statistics
#[derive(Debug, Default)]
pub struct EvictionStats {
    /// Total number of entries evicted
    pub evictions_total: AtomicU64,
    /// Number of writes that had to evict
    pub eviction_runs: AtomicU64,
}

impl EvictionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&self, evicted: usize) {
        self.eviction_runs.fetch_add(1, Ordering::Relaxed);
        self.evictions_total
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn get_evictions_total(&self) -> u64 {
        self.evictions_total.load(Ordering::Relaxed)
    }

    pub fn get_eviction_runs(&self) -> u64 {
        self.eviction_runs.load(Ordering::Relaxed)
    }
}

/// Eviction policy type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicyType {
    /// Least Recently Used
    #[default]
    Lru,
    /// First In, First Out
    Fifo,
}

impl std::str::FromStr for EvictionPolicyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "fifo" => Ok(Self::Fifo),
            _ => anyhow::bail!("Invalid eviction policy: {}. Must be lru or fifo", s),
        }
    }
}

impl EvictionPolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Fifo => "fifo",
        }
    }

    pub fn policy(&self) -> &'static dyn EvictionPolicy {
        match self {
            Self::Lru => &LruPolicy,
            Self::Fifo => &FifoPolicy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_policy_type() {
        assert_eq!(
            "lru".parse::<EvictionPolicyType>().unwrap(),
            EvictionPolicyType::Lru
        );
        assert_eq!(
            "FIFO".parse::<EvictionPolicyType>().unwrap(),
            EvictionPolicyType::Fifo
        );
        assert!("lfu".parse::<EvictionPolicyType>().is_err());
        assert_eq!(EvictionPolicyType::default(), EvictionPolicyType::Lru);
    }

    #[test]
    fn test_stats() {
        let stats = EvictionStats::new();
        stats.record_run(2);
        stats.record_run(1);
        assert_eq!(stats.get_eviction_runs(), 2);
        assert_eq!(stats.get_evictions_total(), 3);
    }
}
