//! Eviction policy implementations
//!
//! A bucket keeps entries ordered by a recency stamp and always evicts the
//! lowest stamp first. Policies decide which accesses re-stamp an entry.

/// Trait for eviction policy implementations
pub trait EvictionPolicy: Send + Sync {
    /// Whether a read moves the entry to the most-recent position
    fn refresh_on_read(&self) -> bool;

    /// Whether overwriting an existing entry moves it to the most-recent position
    fn refresh_on_write(&self) -> bool;
}

/// LRU (Least Recently Used) eviction policy
///
/// A just-loaded or just-read resource is the last to go, which keeps the
/// checkpoint a downstream node is about to consume resident.
#[derive(Debug, Default)]
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn refresh_on_read(&self) -> bool {
        true
    }

    fn refresh_on_write(&self) -> bool {
        true
    }
}

/// FIFO eviction policy
///
/// Entries leave in the order they first arrived.
#[derive(Debug, Default)]
pub struct FifoPolicy;

impl EvictionPolicy for FifoPolicy {
    fn refresh_on_read(&self) -> bool {
        false
    }

    fn refresh_on_write(&self) -> bool {
        false
    }
}
