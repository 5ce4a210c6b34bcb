use serde::{Deserialize, Serialize};

use revcache_expiry::ExpiryConfig;

use crate::error::{CacheError, CacheResult};
use crate::history::LookupStrategy;

/// Configuration for a [`RootCache`](crate::RootCache).
///
/// ```toml
/// lookup = "latest_prior"
///
/// [expiry]
/// policy = "no_longer_used"
/// every = 2
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// How history lookups resolve revisions without an exact entry.
    pub lookup: LookupStrategy,
    /// When and what to expire.
    pub expiry: ExpiryConfig,
}

impl RootConfig {
    pub fn with_lookup(mut self, lookup: LookupStrategy) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.expiry = expiry;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        toml::from_str(source).map_err(|e| CacheError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> CacheResult<String> {
        toml::to_string(self).map_err(|e| CacheError::Config(e.to_string()))
    }
}
