//! Expiration sinks.

use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use revcache_types::{Revision, RevisionKeySet};

use crate::traits::ExpirationSink;

/// Discards expired key sets and never re-hydrates anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl<K, V> ExpirationSink<K, V> for NoopSink {
    fn expired(&self, _keyset: &RevisionKeySet<K>) {}
}

/// Keeps every expired key set in memory, in expiry order.
///
/// Useful for observing expiry and as a starting point for sinks that
/// persist key sets elsewhere. It does not re-hydrate history entries.
pub struct RecordingSink<K, V> {
    expired: Mutex<Vec<RevisionKeySet<K>>>,
    _values: PhantomData<fn() -> V>,
}

impl<K, V> RecordingSink<K, V> {
    pub fn new() -> Self {
        Self {
            expired: Mutex::new(Vec::new()),
            _values: PhantomData,
        }
    }

    /// Revisions of all expired key sets, in expiry order.
    pub fn expired_revisions(&self) -> Vec<Revision> {
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(RevisionKeySet::revision)
            .collect()
    }

    /// Number of key sets received so far.
    pub fn len(&self) -> usize {
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<RevisionKeySet<K>> {
        std::mem::take(&mut *self.expired.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<K, V> Default for RecordingSink<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for RecordingSink<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSink")
            .field("expired", &self.len())
            .finish()
    }
}

impl<K, V> ExpirationSink<K, V> for RecordingSink<K, V>
where
    K: Clone + Send + Sync,
{
    fn expired(&self, keyset: &RevisionKeySet<K>) {
        debug!(
            revision = keyset.revision(),
            keys = keyset.size(),
            "recorded expired key set"
        );
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(keyset.clone());
    }
}
