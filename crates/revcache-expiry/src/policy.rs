//! Canonical expiry policies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use revcache_types::{now_ms, RevisionKeySet};

use crate::traits::{ExpiryContext, ExpiryPolicy};

/// Never removes history.
#[derive(Clone, Copy, Debug, Default)]
pub struct Never;

impl<K> ExpiryPolicy<K> for Never {
    fn should_run(&self, _root: &dyn ExpiryContext) -> bool {
        false
    }

    fn should_expire(&self, _root: &dyn ExpiryContext, _keyset: &RevisionKeySet<K>) -> bool {
        false
    }
}

/// Removes revisions no active working copy can still observe.
///
/// A key set expires when its revision is strictly below the oldest base
/// revision among active working copies. With no active working copies,
/// every revision but the current one expires.
///
/// [`NoLongerUsed::every`] only lets every n-th pass run, which amortizes the
/// cost of expiry over many closes.
#[derive(Debug)]
pub struct NoLongerUsed {
    every: u64,
    calls: AtomicU64,
}

impl NoLongerUsed {
    /// Run on every pass.
    pub fn new() -> Self {
        Self::every(1)
    }

    /// Run on every `n`-th pass. `n = 0` is treated as `1`.
    pub fn every(n: u64) -> Self {
        Self {
            every: n.max(1),
            calls: AtomicU64::new(0),
        }
    }

    /// The configured pass interval.
    pub fn interval(&self) -> u64 {
        self.every
    }
}

impl Default for NoLongerUsed {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ExpiryPolicy<K> for NoLongerUsed {
    fn should_run(&self, _root: &dyn ExpiryContext) -> bool {
        let calls = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        calls % self.every == 0
    }

    fn should_expire(&self, root: &dyn ExpiryContext, keyset: &RevisionKeySet<K>) -> bool {
        match root.oldest_active_revision() {
            Some(oldest) => keyset.revision() < oldest,
            None => true,
        }
    }
}

/// Removes revisions whose key set is older than a fixed age.
#[derive(Clone, Copy, Debug)]
pub struct TimeBased {
    ttl: Duration,
}

impl TimeBased {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K> ExpiryPolicy<K> for TimeBased {
    fn should_run(&self, _root: &dyn ExpiryContext) -> bool {
        true
    }

    fn should_expire(&self, _root: &dyn ExpiryContext, keyset: &RevisionKeySet<K>) -> bool {
        let age_ms = now_ms().saturating_sub(keyset.timestamp_ms());
        u128::from(age_ms) > self.ttl.as_millis()
    }
}
