use std::fmt;
use std::sync::Arc;

use crate::policy::NoLongerUsed;
use crate::sink::NoopSink;
use crate::traits::{ExpirationSink, ExpiryPolicy};

/// The expiry policy and expiration sink a root works with.
///
/// Cloning is cheap: both halves are shared.
pub struct CacheExpiry<K, V> {
    policy: Arc<dyn ExpiryPolicy<K>>,
    sink: Arc<dyn ExpirationSink<K, V>>,
}

impl<K, V> CacheExpiry<K, V> {
    /// Pair `policy` with a [`NoopSink`].
    pub fn new(policy: impl ExpiryPolicy<K> + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
            sink: Arc::new(NoopSink),
        }
    }

    /// Pair `policy` with an explicit sink.
    pub fn with_sink(
        policy: impl ExpiryPolicy<K> + 'static,
        sink: Arc<dyn ExpirationSink<K, V>>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            sink,
        }
    }

    /// Assemble from already shared halves.
    pub fn from_parts(
        policy: Arc<dyn ExpiryPolicy<K>>,
        sink: Arc<dyn ExpirationSink<K, V>>,
    ) -> Self {
        Self { policy, sink }
    }

    pub fn policy(&self) -> &Arc<dyn ExpiryPolicy<K>> {
        &self.policy
    }

    pub fn sink(&self) -> &Arc<dyn ExpirationSink<K, V>> {
        &self.sink
    }
}

impl<K, V> Clone for CacheExpiry<K, V> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<K, V> Default for CacheExpiry<K, V> {
    /// [`NoLongerUsed`] on every pass, no-op sink.
    fn default() -> Self {
        Self::new(NoLongerUsed::new())
    }
}

impl<K, V> fmt::Debug for CacheExpiry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheExpiry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Never;
    use crate::sink::RecordingSink;
    use crate::traits::ExpiryContext;
    use revcache_types::{Revision, RevisionKeySet};

    struct Idle;

    impl ExpiryContext for Idle {
        fn current_revision(&self) -> Revision {
            4
        }

        fn active_revisions(&self) -> Vec<Revision> {
            Vec::new()
        }
    }

    #[test]
    fn default_runs_no_longer_used() {
        let expiry: CacheExpiry<u32, String> = CacheExpiry::default();
        assert!(expiry.policy().should_run(&Idle));
        let keyset = RevisionKeySet::with_keys(1, vec![1u32]);
        assert!(expiry.policy().should_expire(&Idle, &keyset));
    }

    #[test]
    fn clone_shares_sink() {
        let sink = Arc::new(RecordingSink::<u32, String>::new());
        let expiry = CacheExpiry::with_sink(Never, sink.clone());
        let copy = expiry.clone();
        copy.sink().expired(&RevisionKeySet::with_keys(3, vec![7]));
        assert_eq!(sink.expired_revisions(), vec![3]);
        assert!(!copy.policy().should_run(&Idle));
    }
}
