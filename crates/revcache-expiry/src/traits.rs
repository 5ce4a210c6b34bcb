//! The seams between a root and its expiry collaborators.

use revcache_types::{Revision, RevisionEntry, RevisionKeySet};

/// Read-only view of a root, as seen by an [`ExpiryPolicy`].
///
/// Implemented by the root's locked state, so every call is answered from
/// the same consistent snapshot the expiry pass works on.
pub trait ExpiryContext {
    /// The root's current (head) revision.
    fn current_revision(&self) -> Revision;

    /// Base revisions of all working copies currently checked out.
    ///
    /// One element per working copy; duplicates are expected.
    fn active_revisions(&self) -> Vec<Revision>;

    /// The smallest base revision among active working copies, if any.
    fn oldest_active_revision(&self) -> Option<Revision> {
        self.active_revisions().into_iter().min()
    }
}

/// Decides when expiry runs and which revisions it drops.
///
/// Called while the root's write lock is held: implementations must be fast
/// and must not block.
pub trait ExpiryPolicy<K>: Send + Sync {
    /// Whether an expiry pass should run at all.
    ///
    /// Called once per pass; stateful policies may count invocations here.
    fn should_run(&self, root: &dyn ExpiryContext) -> bool;

    /// Whether `keyset` should be dropped from the root.
    ///
    /// Never consulted for the current revision's key set.
    fn should_expire(&self, root: &dyn ExpiryContext, keyset: &RevisionKeySet<K>) -> bool;
}

/// Offload target for expired revisions.
pub trait ExpirationSink<K, V>: Send + Sync {
    /// Called (under the root's write lock) for every key set that was
    /// dropped. Must be fast.
    fn expired(&self, keyset: &RevisionKeySet<K>);

    /// Re-hydrate the entry for `key` at `revision` when it is no longer
    /// resident in memory.
    ///
    /// Returns `None` when the sink has nothing for that revision.
    fn retrieve(&self, key: &K, revision: Revision) -> Option<RevisionEntry<K, V>> {
        let _ = (key, revision);
        None
    }
}
