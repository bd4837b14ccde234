//! Cache keys
//!
//! Keys live in one flat namespace that mixes text and integer identities.
//! `Text("7")` and `Number(7)` are different entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Text key meaning "all entries". Only valid for bulk removal.
pub const RESERVED_KEY: &str = "*";

/// Identity of a cached entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheKey {
    Number(u64),
    Text(String),
}

impl CacheKey {
    /// True for the `"*"` sentinel, which must never be stored
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Text(s) if s == RESERVED_KEY)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u64> for CacheKey {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}
