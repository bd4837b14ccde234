// Library interface for Tagstash
// This allows integration tests and graph hosts to use Tagstash's modules

pub mod cache;
pub mod config;
pub mod config_discovery;
pub mod error;
pub mod eviction;
pub mod key;
pub mod load_policy;
pub mod logging;
pub mod nodes;
pub mod revision;

// Re-export commonly used types
pub use cache::{Entry, Payload, TagSettings, TaggedCache};
pub use config::TagstashConfig;
pub use config_discovery::{discover_config, load_config_with_discovery, LoadedConfig};
pub use error::{BackendError, Result};
pub use eviction::EvictionPolicyType;
pub use key::CacheKey;
pub use load_policy::LoadMode;
pub use nodes::{Artifact, Backend, ResourceLoader};
pub use revision::{Fingerprint, Revision};
