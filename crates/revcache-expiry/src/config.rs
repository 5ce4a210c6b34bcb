use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::expiry::CacheExpiry;
use crate::policy::{Never, NoLongerUsed, TimeBased};
use crate::traits::ExpirationSink;

/// Serializable description of a root's expiry policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ExpiryConfig {
    /// Keep every revision forever.
    Never,
    /// Drop revisions no active working copy uses, on every `every`-th pass.
    NoLongerUsed {
        #[serde(default = "default_every")]
        every: u64,
    },
    /// Drop revisions older than `ttl_ms` milliseconds.
    TimeBased { ttl_ms: u64 },
}

fn default_every() -> u64 {
    1
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self::NoLongerUsed { every: 1 }
    }
}

impl ExpiryConfig {
    /// Build the configured policy with a no-op sink.
    pub fn build<K, V>(&self) -> CacheExpiry<K, V> {
        match *self {
            Self::Never => CacheExpiry::new(Never),
            Self::NoLongerUsed { every } => CacheExpiry::new(NoLongerUsed::every(every)),
            Self::TimeBased { ttl_ms } => {
                CacheExpiry::new(TimeBased::new(Duration::from_millis(ttl_ms)))
            }
        }
    }

    /// Build the configured policy with `sink`.
    pub fn build_with_sink<K, V>(&self, sink: Arc<dyn ExpirationSink<K, V>>) -> CacheExpiry<K, V> {
        let expiry: CacheExpiry<K, V> = self.build();
        CacheExpiry::from_parts(Arc::clone(expiry.policy()), sink)
    }
}
