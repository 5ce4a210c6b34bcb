//! The shared root of a revision cache.
//!
//! [`RootCache`] owns the revision timeline: one [`KeyHistory`] per key, one
//! [`RevisionKeySet`] per retained revision and the registry of working
//! copies checked out from it. All state sits behind a single `RwLock`;
//! reads take it shared, commit, close and expiry take it exclusively.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use revcache_expiry::{CacheExpiry, ExpiryContext};
use revcache_types::{Revision, RevisionEntry, RevisionKeySet};

use crate::config::RootConfig;
use crate::error::{CacheError, CacheResult};
use crate::export::ReadOnlyCopy;
use crate::factory::ElementFactory;
use crate::history::{KeyHistory, LookupStrategy, Visible};
use crate::map::CacheMap;
use crate::working_copy::{CheckoutId, WorkingCopy};

/// A working copy registered with the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCheckout {
    pub id: CheckoutId,
    pub revision: Revision,
}

struct RootState<K, V> {
    revision: Revision,
    histories: HashMap<K, KeyHistory<K, V>>,
    keysets: BTreeMap<Revision, Arc<RevisionKeySet<K>>>,
    active: BTreeMap<CheckoutId, Revision>,
    factory: Arc<dyn ElementFactory<V>>,
    expiry: CacheExpiry<K, V>,
    lookup: LookupStrategy,
}

impl<K, V> ExpiryContext for RootState<K, V> {
    fn current_revision(&self) -> Revision {
        self.revision
    }

    fn active_revisions(&self) -> Vec<Revision> {
        self.active.values().copied().collect()
    }
}

impl<K, V> RootState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn current_keyset(&self) -> CacheResult<&Arc<RevisionKeySet<K>>> {
        self.keysets.get(&self.revision).ok_or_else(|| {
            CacheError::InvariantViolated(format!(
                "key set of current revision {} is missing",
                self.revision
            ))
        })
    }

    fn keyset_at(&self, revision: Revision) -> CacheResult<&Arc<RevisionKeySet<K>>> {
        self.check_range(revision)?;
        self.keysets.get(&revision).ok_or_else(|| CacheError::OutOfRange {
            revision,
            reason: "revision has been expired".into(),
        })
    }

    fn check_range(&self, revision: Revision) -> CacheResult<()> {
        if revision > self.revision {
            return Err(CacheError::OutOfRange {
                revision,
                reason: format!("current revision is {}", self.revision),
            });
        }
        Ok(())
    }

    /// The value of `key` visible at `revision`, uncloned.
    ///
    /// A retained key set is authoritative for membership. Without one the
    /// lookup is answered by the key's history, then by the sink.
    fn visible(&self, revision: Revision, key: &K) -> CacheResult<Option<Visible<'_, V>>> {
        self.check_range(revision)?;
        if let Some(keyset) = self.keysets.get(&revision) {
            if !keyset.contains(key) {
                return Ok(None);
            }
        }
        let sink = &**self.expiry.sink();
        Ok(match self.histories.get(key) {
            Some(history) => history.get_at(revision, self.lookup, sink),
            None => sink
                .retrieve(key, revision)
                .and_then(RevisionEntry::into_value)
                .map(Visible::Retrieved),
        })
    }

    fn value_at(&self, revision: Revision, key: &K) -> CacheResult<Option<V>> {
        Ok(self.visible(revision, key)?.map(|visible| match visible {
            Visible::Resident(value) => self.factory.clone_element(value),
            Visible::Retrieved(value) => value,
        }))
    }

    /// Run one expiry pass. Returns the number of key sets dropped.
    fn expire(&mut self) -> usize {
        let policy = Arc::clone(self.expiry.policy());
        if !policy.should_run(&*self) {
            return 0;
        }

        let current = self.revision;
        let context: &Self = self;
        let doomed: BTreeSet<Revision> = context
            .keysets
            .values()
            .filter(|keyset| keyset.revision() != current && policy.should_expire(context, keyset))
            .map(|keyset| keyset.revision())
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let mut protected: BTreeSet<Revision> = self
            .keysets
            .keys()
            .filter(|revision| !doomed.contains(revision))
            .copied()
            .collect();
        protected.extend(self.active.values().copied());
        protected.insert(current);

        let sink = Arc::clone(self.expiry.sink());
        let lookup = self.lookup;
        for &revision in &doomed {
            let Some(keyset) = self.keysets.remove(&revision) else {
                continue;
            };
            let mut pruned = 0usize;
            let mut dropped = 0usize;
            for key in keyset.iter() {
                let emptied = match self.histories.get_mut(key) {
                    Some(history) => {
                        pruned += history.prune_at(revision, lookup, &protected);
                        history.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    self.histories.remove(key);
                    dropped += 1;
                }
            }
            trace!(revision, pruned, dropped, "expired revision");
            sink.expired(&keyset);
        }

        debug!(
            expired = doomed.len(),
            retained = self.keysets.len(),
            histories = self.histories.len(),
            "expiry pass complete"
        );
        doomed.len()
    }
}

/// The authoritative, thread-safe store of all revisions.
///
/// # Example
///
/// ```
/// use revcache_core::{CloneFactory, RootCache};
///
/// let root: RootCache<&str, String> = RootCache::new(CloneFactory::new());
///
/// let mut wc = root.checkout().unwrap();
/// wc.add("greeting", "hello".to_string());
/// let revision = root.commit(&wc).unwrap();
/// wc.close().unwrap();
///
/// assert_eq!(revision, 1);
/// assert_eq!(root.get(&"greeting").unwrap().as_deref(), Some("hello"));
/// ```
pub struct RootCache<K, V> {
    state: RwLock<RootState<K, V>>,
    next_checkout: AtomicU64,
}

impl<K, V> RootCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// An empty root at revision `0` with the default expiry and lookup.
    pub fn new(factory: impl ElementFactory<V> + 'static) -> Self {
        Self::from_parts(
            Arc::new(factory),
            CacheExpiry::default(),
            LookupStrategy::default(),
        )
    }

    /// An empty root configured from `config`.
    pub fn with_config(factory: impl ElementFactory<V> + 'static, config: &RootConfig) -> Self {
        Self::from_parts(Arc::new(factory), config.expiry.build(), config.lookup)
    }

    pub fn from_parts(
        factory: Arc<dyn ElementFactory<V>>,
        expiry: CacheExpiry<K, V>,
        lookup: LookupStrategy,
    ) -> Self {
        let mut keysets = BTreeMap::new();
        keysets.insert(0, Arc::new(RevisionKeySet::new(0)));
        Self {
            state: RwLock::new(RootState {
                revision: 0,
                histories: HashMap::new(),
                keysets,
                active: BTreeMap::new(),
                factory,
                expiry,
                lookup,
            }),
            next_checkout: AtomicU64::new(1),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn current_revision(&self) -> CacheResult<Revision> {
        Ok(self.read()?.revision)
    }

    /// Number of keys live at the current revision.
    pub fn size(&self) -> CacheResult<usize> {
        Ok(self.read()?.current_keyset()?.size())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Keys live at the current revision.
    pub fn keys(&self) -> CacheResult<Vec<K>> {
        Ok(self.read()?.current_keyset()?.keys().to_vec())
    }

    /// Keys live at `revision`.
    ///
    /// Fails with [`CacheError::OutOfRange`] for future or expired revisions.
    pub fn keys_at(&self, revision: Revision) -> CacheResult<Vec<K>> {
        Ok(self.read()?.keyset_at(revision)?.keys().to_vec())
    }

    /// The shared key set of `revision`.
    pub fn keyset_at(&self, revision: Revision) -> CacheResult<Arc<RevisionKeySet<K>>> {
        Ok(Arc::clone(self.read()?.keyset_at(revision)?))
    }

    pub fn contains_key(&self, key: &K) -> CacheResult<bool> {
        let state = self.read()?;
        Ok(state.visible(state.revision, key)?.is_some())
    }

    pub fn contains_at(&self, revision: Revision, key: &K) -> CacheResult<bool> {
        Ok(self.read()?.visible(revision, key)?.is_some())
    }

    /// A deep clone of the current value of `key`.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        let state = self.read()?;
        state.value_at(state.revision, key)
    }

    /// A deep clone of the value of `key` at `revision`.
    ///
    /// Fails with [`CacheError::OutOfRange`] if `revision` is in the future.
    pub fn get_at(&self, revision: Revision, key: &K) -> CacheResult<Option<V>> {
        self.read()?.value_at(revision, key)
    }

    /// Revisions whose key sets are still retained, ascending.
    pub fn retained_revisions(&self) -> CacheResult<Vec<Revision>> {
        Ok(self.read()?.keysets.keys().copied().collect())
    }

    /// Revisions with a resident history entry for `key`, ascending.
    pub fn history_revisions(&self, key: &K) -> CacheResult<Vec<Revision>> {
        Ok(self
            .read()?
            .histories
            .get(key)
            .map(KeyHistory::revisions)
            .unwrap_or_default())
    }

    /// Working copies currently checked out, oldest first.
    pub fn active_copies(&self) -> CacheResult<Vec<ActiveCheckout>> {
        Ok(self
            .read()?
            .active
            .iter()
            .map(|(id, revision)| ActiveCheckout {
                id: *id,
                revision: *revision,
            })
            .collect())
    }

    /// A consistent, deep-cloned snapshot of the current revision.
    ///
    /// Only the read lock is held; unlike [`RootCache::close`] this never
    /// runs an expiry pass.
    pub fn as_map(&self) -> CacheResult<CacheMap<K, V>> {
        let state = self.read()?;
        let keyset = state.current_keyset()?;
        let mut entries = Vec::with_capacity(keyset.size());
        for key in keyset.iter() {
            if let Some(value) = state.value_at(state.revision, key)? {
                entries.push((key.clone(), value));
            }
        }
        Ok(CacheMap::new(state.revision, entries))
    }

    // -----------------------------------------------------------------------
    // Working copies
    // -----------------------------------------------------------------------

    /// Check out a working copy at the current revision.
    pub fn checkout(&self) -> CacheResult<WorkingCopy<'_, K, V>> {
        let mut state = self.write()?;
        let base = Arc::clone(state.current_keyset()?);
        let id = CheckoutId::new(self.next_checkout.fetch_add(1, Ordering::Relaxed));
        state.active.insert(id, base.revision());
        debug!(
            checkout = %id,
            revision = base.revision(),
            active = state.active.len(),
            "checked out working copy"
        );
        Ok(WorkingCopy::new(self, id, base))
    }

    /// A read-only snapshot of the current revision. Not registered.
    pub fn export(&self) -> CacheResult<ReadOnlyCopy<'_, K, V>> {
        let state = self.read()?;
        let base = Arc::clone(state.current_keyset()?);
        Ok(ReadOnlyCopy::new(self, base))
    }

    /// Fold the working copy's staged changes into a new revision.
    ///
    /// Additions must not exist at the head (a key deleted earlier may be
    /// added again). Modified and removed keys must still exist. Modified
    /// values are stored as a clone of `merge(head, local)`. Everything is
    /// validated and every factory call is made before any state changes,
    /// so a failed commit leaves the root untouched. The working copy stays
    /// open and keeps its base revision.
    pub fn commit(&self, wc: &WorkingCopy<'_, K, V>) -> CacheResult<Revision> {
        if !std::ptr::eq(wc.root(), self) {
            return Err(CacheError::InvariantViolated(
                "working copy was checked out from a different root".into(),
            ));
        }
        let changes = wc.changes();
        let mut state = self.write()?;

        for key in changes.added() {
            if state.histories.get(key).is_some_and(|h| !h.is_deleted_at_head()) {
                return Err(CacheError::InvariantViolated(format!(
                    "added key already exists at revision {}",
                    state.revision
                )));
            }
        }
        for key in changes.modified().iter().chain(changes.removed()) {
            if !state.histories.get(key).is_some_and(|h| !h.is_deleted_at_head()) {
                return Err(CacheError::InvariantViolated(format!(
                    "changed key no longer exists at revision {}",
                    state.revision
                )));
            }
        }

        let factory = Arc::clone(&state.factory);
        let added = changes
            .added()
            .iter()
            .map(|key| {
                let value = changes.local(key).ok_or_else(|| missing_local("added"))?;
                Ok((key.clone(), factory.clone_element(value)))
            })
            .collect::<CacheResult<Vec<_>>>()?;
        let modified = changes
            .modified()
            .iter()
            .map(|key| {
                let local = changes.local(key).ok_or_else(|| missing_local("modified"))?;
                let head = state
                    .histories
                    .get(key)
                    .and_then(KeyHistory::leading)
                    .ok_or_else(|| {
                        CacheError::InvariantViolated("modified key has no head value".into())
                    })?;
                let merged = factory.merge(head, local);
                Ok((key.clone(), factory.clone_element(&merged)))
            })
            .collect::<CacheResult<Vec<_>>>()?;

        let mut keys: Vec<K> = state
            .current_keyset()?
            .iter()
            .filter(|key| !changes.is_removed(key))
            .cloned()
            .collect();
        keys.extend(changes.added().iter().cloned());

        let (added_count, modified_count) = (added.len(), modified.len());
        let state = &mut *state;
        let next = state.revision + 1;
        for (key, value) in added {
            state
                .histories
                .entry(key.clone())
                .or_insert_with(|| KeyHistory::new(key))
                .record_added(next, value);
        }
        for (key, value) in modified {
            if let Some(history) = state.histories.get_mut(&key) {
                history.record_modified(next, value);
            }
        }
        for key in changes.removed() {
            if let Some(history) = state.histories.get_mut(key) {
                history.record_deleted(next);
            }
        }
        state
            .keysets
            .insert(next, Arc::new(RevisionKeySet::with_keys(next, keys)));
        state.revision = next;

        debug!(
            revision = next,
            checkout = %wc.id(),
            added = added_count,
            modified = modified_count,
            removed = changes.removed().len(),
            "committed working copy"
        );
        Ok(next)
    }

    /// Unregister `wc` and run an expiry pass.
    pub fn close(&self, mut wc: WorkingCopy<'_, K, V>) -> CacheResult<()> {
        if !std::ptr::eq(wc.root(), self) {
            return Err(CacheError::InvariantViolated(
                "working copy was checked out from a different root".into(),
            ));
        }
        let id = wc.id();
        wc.mark_released();
        drop(wc);

        let mut state = self.write()?;
        state.active.remove(&id);
        let expired = state.expire();
        debug!(checkout = %id, expired, active = state.active.len(), "closed working copy");
        Ok(())
    }

    /// Run an expiry pass outside of [`RootCache::close`].
    ///
    /// Returns the number of revisions dropped.
    pub fn expire(&self) -> CacheResult<usize> {
        Ok(self.write()?.expire())
    }

    /// Those of `candidates` live at the current revision, each with a deep
    /// clone of its current value.
    pub(crate) fn live_values(&self, candidates: &[K]) -> CacheResult<Vec<(K, V)>> {
        let state = self.read()?;
        let current = state.current_keyset()?;
        let mut live = Vec::new();
        for key in candidates {
            if !current.contains(key) {
                continue;
            }
            if let Some(value) = state.histories.get(key).and_then(KeyHistory::leading) {
                live.push((key.clone(), state.factory.clone_element(value)));
            }
        }
        Ok(live)
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    pub fn factory(&self) -> CacheResult<Arc<dyn ElementFactory<V>>> {
        Ok(Arc::clone(&self.read()?.factory))
    }

    /// Replace the element factory. Applies to the next clone or merge.
    pub fn set_factory(&self, factory: Arc<dyn ElementFactory<V>>) -> CacheResult<()> {
        self.write()?.factory = factory;
        Ok(())
    }

    pub fn expiry(&self) -> CacheResult<CacheExpiry<K, V>> {
        Ok(self.read()?.expiry.clone())
    }

    /// Replace the expiry policy and sink. Applies from the next pass.
    pub fn set_expiry(&self, expiry: CacheExpiry<K, V>) -> CacheResult<()> {
        self.write()?.expiry = expiry;
        Ok(())
    }

    pub fn lookup(&self) -> CacheResult<LookupStrategy> {
        Ok(self.read()?.lookup)
    }
}

impl<K, V> RootCache<K, V> {
    fn read(&self) -> CacheResult<RwLockReadGuard<'_, RootState<K, V>>> {
        self.state.read().map_err(|_| CacheError::LockPoisoned)
    }

    fn write(&self) -> CacheResult<RwLockWriteGuard<'_, RootState<K, V>>> {
        self.state.write().map_err(|_| CacheError::LockPoisoned)
    }

    /// Unregister a working copy without running expiry.
    pub(crate) fn release(&self, id: CheckoutId) -> CacheResult<bool> {
        let released = self.write()?.active.remove(&id).is_some();
        if released {
            debug!(checkout = %id, "released dropped working copy");
        }
        Ok(released)
    }
}

impl<K, V> fmt::Debug for RootCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("RootCache");
        match self.state.try_read() {
            Ok(state) => out
                .field("revision", &state.revision)
                .field("retained", &state.keysets.len())
                .field("histories", &state.histories.len())
                .field("active", &state.active.len())
                .field("lookup", &state.lookup),
            Err(_) => out.field("state", &"<locked>"),
        };
        out.finish()
    }
}

fn missing_local(kind: &str) -> CacheError {
    CacheError::InvariantViolated(format!("{kind} key has no staged value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::CloneFactory;
    use revcache_expiry::{Never, NoLongerUsed, RecordingSink, TimeBased};
    use std::time::Duration;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Doc {
        value: Option<String>,
    }

    impl Doc {
        fn new(value: &str) -> Self {
            Self {
                value: Some(value.to_string()),
            }
        }
    }

    /// Merges by joining the repository and local values.
    struct Joining;

    impl ElementFactory<Doc> for Joining {
        fn clone_element(&self, value: &Doc) -> Doc {
            value.clone()
        }

        fn merge(&self, repository: &Doc, local: &Doc) -> Doc {
            let part = |doc: &Doc| doc.value.clone().unwrap_or_default();
            Doc::new(&format!("{}+{}", part(repository), part(local)))
        }
    }

    type Root = RootCache<u64, Doc>;

    fn root() -> Root {
        RootCache::new(CloneFactory::new())
    }

    /// One commit per key, closing each working copy.
    fn seeded(keys: u64) -> Root {
        let root = root();
        for k in 0..keys {
            let mut wc = root.checkout().unwrap();
            wc.add(k, Doc::default());
            root.commit(&wc).unwrap();
            wc.close().unwrap();
        }
        root
    }

    fn commit_one(root: &Root, key: u64, value: &str) -> Revision {
        let mut wc = root.checkout().unwrap();
        if wc.contains_key(&key) {
            wc.replace(key, Doc::new(value)).unwrap();
        } else {
            wc.add(key, Doc::new(value));
        }
        let revision = root.commit(&wc).unwrap();
        wc.close().unwrap();
        revision
    }

    // -----------------------------------------------------------------------
    // Basic timeline
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_root_is_empty_at_revision_zero() {
        let root = root();
        assert_eq!(root.current_revision().unwrap(), 0);
        assert_eq!(root.size().unwrap(), 0);
        assert!(root.is_empty().unwrap());
        assert_eq!(root.keys_at(0).unwrap(), Vec::<u64>::new());
        assert_eq!(root.retained_revisions().unwrap(), vec![0]);
    }

    #[test]
    fn empty_commit_advances_revision() {
        let root = root();
        let wc = root.checkout().unwrap();
        assert_eq!(root.commit(&wc).unwrap(), 1);
        wc.close().unwrap();
        assert_eq!(root.current_revision().unwrap(), 1);
        assert_eq!(root.size().unwrap(), 0);
    }

    #[test]
    fn committed_value_is_isolated_from_callers() {
        let root = root();
        let mut wc = root.checkout().unwrap();
        wc.add(1, Doc::default());
        root.commit(&wc).unwrap();
        wc.get(&1).unwrap().unwrap().value = Some("after commit".into());
        wc.close().unwrap();

        let mut second = root.checkout().unwrap();
        let mut third = root.checkout().unwrap();
        second.get(&1).unwrap().unwrap().value = Some("mutated".into());

        assert_eq!(third.get(&1).unwrap().unwrap(), &Doc::default());
        assert_eq!(root.get(&1).unwrap(), Some(Doc::default()));
    }

    #[test]
    fn working_copy_keeps_its_snapshot() {
        let root = root();
        let mut first = root.checkout().unwrap();
        first.add(1, Doc::new("one"));
        root.commit(&first).unwrap();

        let mut second = root.checkout().unwrap();
        assert!(second.get(&1).unwrap().is_some());
        second.add(2, Doc::new("two"));
        root.commit(&second).unwrap();

        assert_eq!(first.size(), 1);
        assert_eq!(second.size(), 2);
        assert_eq!(root.size().unwrap(), 2);
        assert!(first.get(&2).unwrap().is_none());
        assert!(root.get(&2).unwrap().is_some());
    }

    #[test]
    fn successive_removals() {
        let root = seeded(100);
        for key in [0, 99, 49] {
            let mut wc = root.checkout().unwrap();
            wc.remove(&key).unwrap();
            root.commit(&wc).unwrap();
            wc.close().unwrap();
            assert!(root.get(&key).unwrap().is_none());
        }
        assert_eq!(root.size().unwrap(), 97);
        assert!(!root.contains_key(&49).unwrap());
        assert!(root.contains_key(&50).unwrap());
    }

    #[test]
    fn bulk_removal_in_batches() {
        let root = seeded(50);
        for batch in 0..5u64 {
            let mut wc = root.checkout().unwrap();
            for k in batch * 10..batch * 10 + 10 {
                wc.remove(&k).unwrap();
            }
            assert_eq!(wc.size(), 50 - (batch as usize + 1) * 10);
            root.commit(&wc).unwrap();
            wc.close().unwrap();
        }
        assert_eq!(root.size().unwrap(), 0);
    }

    #[test]
    fn merged_value_reaches_root_without_touching_input() {
        let root = seeded(3);
        let original = Doc::default();
        let mut wc = root.checkout().unwrap();
        wc.add(500, original.clone());
        root.commit(&wc).unwrap();
        wc.close().unwrap();

        let mut wc = root.checkout().unwrap();
        wc.get(&500).unwrap().unwrap().value = Some("abcd".into());
        root.commit(&wc).unwrap();
        wc.close().unwrap();

        assert_eq!(root.get(&500).unwrap(), Some(Doc::new("abcd")));
        assert_eq!(original.value, None);
    }

    // -----------------------------------------------------------------------
    // History and tombstones
    // -----------------------------------------------------------------------

    #[test]
    fn deleted_key_stays_visible_at_older_revisions() {
        let root = root();
        root.set_expiry(CacheExpiry::new(Never)).unwrap();
        let added_at = commit_one(&root, 7, "seven");

        let mut wc = root.checkout().unwrap();
        wc.remove(&7).unwrap();
        let removed_at = root.commit(&wc).unwrap();
        wc.close().unwrap();
        commit_one(&root, 8, "eight");

        assert_eq!(root.get_at(added_at, &7).unwrap(), Some(Doc::new("seven")));
        assert_eq!(root.get_at(removed_at, &7).unwrap(), None);
        assert_eq!(root.get(&7).unwrap(), None);
        assert!(root.contains_at(added_at, &7).unwrap());
        assert!(!root.contains_at(removed_at + 1, &7).unwrap());
    }

    #[test]
    fn key_can_be_added_again_after_delete() {
        let root = root();
        root.set_expiry(CacheExpiry::new(Never)).unwrap();
        commit_one(&root, 1, "first");
        let mut wc = root.checkout().unwrap();
        wc.remove(&1).unwrap();
        root.commit(&wc).unwrap();
        wc.close().unwrap();

        let revision = commit_one(&root, 1, "second");
        assert_eq!(root.get(&1).unwrap(), Some(Doc::new("second")));
        assert_eq!(root.history_revisions(&1).unwrap(), vec![1, 2, revision]);
    }

    #[test]
    fn lookup_strategies_disagree_on_stale_history() {
        let build = |lookup| {
            let config = RootConfig::default()
                .with_lookup(lookup)
                .with_expiry(revcache_expiry::ExpiryConfig::Never);
            let root = RootCache::with_config(CloneFactory::new(), &config);
            commit_one(&root, 1, "v1");
            commit_one(&root, 1, "v2");
            commit_one(&root, 2, "unrelated");
            root
        };

        let earliest = build(LookupStrategy::EarliestPrior);
        let latest = build(LookupStrategy::LatestPrior);

        // Revision 2 has an exact entry, revision 3 does not.
        assert_eq!(earliest.get_at(2, &1).unwrap(), Some(Doc::new("v2")));
        assert_eq!(latest.get_at(2, &1).unwrap(), Some(Doc::new("v2")));
        assert_eq!(earliest.get(&1).unwrap(), Some(Doc::new("v1")));
        assert_eq!(latest.get(&1).unwrap(), Some(Doc::new("v2")));
    }

    #[test]
    fn future_revision_is_out_of_range() {
        let root = seeded(1);
        assert!(matches!(
            root.get_at(5, &0),
            Err(CacheError::OutOfRange { revision: 5, .. })
        ));
        assert!(matches!(
            root.keys_at(2),
            Err(CacheError::OutOfRange { revision: 2, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Commit validation
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_add_fails_atomically() {
        let root = seeded(2);
        let mut wc = root.checkout().unwrap();
        wc.add(10, Doc::new("new"));
        wc.remove(&0).unwrap();
        wc.add(1, Doc::new("duplicate"));

        let before = root.current_revision().unwrap();
        assert!(matches!(
            root.commit(&wc),
            Err(CacheError::InvariantViolated(_))
        ));
        assert_eq!(root.current_revision().unwrap(), before);
        assert!(root.get(&10).unwrap().is_none());
        assert!(root.contains_key(&0).unwrap());
        assert_eq!(root.size().unwrap(), 2);
    }

    #[test]
    fn modifying_a_key_removed_upstream_fails() {
        let root = seeded(1);
        let mut stale = root.checkout().unwrap();
        stale.replace(0, Doc::new("late")).unwrap();

        let mut wc = root.checkout().unwrap();
        wc.remove(&0).unwrap();
        root.commit(&wc).unwrap();

        assert!(root.commit(&stale).is_err());
    }

    #[test]
    fn commit_from_another_root_is_rejected() {
        let a = root();
        let b = root();
        let wc = a.checkout().unwrap();
        assert!(b.commit(&wc).is_err());
        assert_eq!(b.current_revision().unwrap(), 0);
    }

    #[test]
    fn reverted_commit_only_advances_revision() {
        let root = seeded(2);
        let mut wc = root.checkout().unwrap();
        wc.add(9, Doc::default());
        wc.remove(&0).unwrap();
        wc.revert();
        let revision = root.commit(&wc).unwrap();
        wc.close().unwrap();

        assert_eq!(revision, 3);
        assert_eq!(root.keys().unwrap(), vec![0, 1]);
        assert_eq!(root.history_revisions(&0).unwrap(), vec![1]);
    }

    #[test]
    fn custom_factory_is_used_for_merges() {
        let root: Root = RootCache::new(Joining);
        commit_one(&root, 1, "base");
        commit_one(&root, 1, "next");
        assert_eq!(root.get(&1).unwrap(), Some(Doc::new("base+next")));
    }

    #[test]
    fn concurrent_commits_are_serialized() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let root = root();
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let root = &root;
                scope.spawn(move || {
                    for i in 0..10u64 {
                        let mut wc = root.checkout().unwrap();
                        wc.add(t * 100 + i, Doc::default());
                        root.commit(&wc).unwrap();
                        wc.close().unwrap();
                    }
                });
            }
        });
        assert_eq!(root.current_revision().unwrap(), 40);
        assert_eq!(root.size().unwrap(), 40);
        assert!(root.active_copies().unwrap().is_empty());
        assert_eq!(root.retained_revisions().unwrap(), vec![40]);
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    #[test]
    fn close_expires_revisions_no_longer_used() {
        let root = seeded(3);
        assert_eq!(root.retained_revisions().unwrap(), vec![3]);
    }

    #[test]
    fn expiry_retains_active_bases() {
        let root = root();
        root.set_expiry(CacheExpiry::new(Never)).unwrap();
        for k in 0..3 {
            commit_one(&root, k, "v");
        }

        let mut oldest = root.checkout().unwrap();
        commit_one(&root, 10, "x");
        let newer = root.checkout().unwrap();
        commit_one(&root, 11, "y");
        assert_eq!(root.retained_revisions().unwrap(), vec![0, 1, 2, 3, 4, 5]);

        root.set_expiry(CacheExpiry::new(NoLongerUsed::every(2))).unwrap();
        assert_eq!(root.expire().unwrap(), 0);

        assert_eq!(newer.revision(), 4);
        newer.close().unwrap();
        assert_eq!(root.retained_revisions().unwrap(), vec![3, 4, 5]);
        assert!(matches!(
            root.keys_at(2),
            Err(CacheError::OutOfRange { revision: 2, .. })
        ));
        assert_eq!(oldest.revision(), 3);
        assert_eq!(oldest.get(&2).unwrap().unwrap(), &Doc::new("v"));

        oldest.close().unwrap();
        assert_eq!(root.retained_revisions().unwrap(), vec![3, 4, 5]);
        assert_eq!(root.expire().unwrap(), 2);
        assert_eq!(root.retained_revisions().unwrap(), vec![5]);
    }

    #[test]
    fn expired_key_sets_reach_the_sink() {
        let root = root();
        let sink = Arc::new(RecordingSink::<u64, Doc>::new());
        root.set_expiry(CacheExpiry::with_sink(NoLongerUsed::new(), sink.clone()))
            .unwrap();
        commit_one(&root, 1, "a");
        commit_one(&root, 2, "b");
        assert_eq!(sink.expired_revisions(), vec![0, 1]);
    }

    #[test]
    fn pruning_drops_deleted_histories() {
        let root = seeded(2);
        let mut wc = root.checkout().unwrap();
        wc.remove(&0).unwrap();
        root.commit(&wc).unwrap();
        wc.close().unwrap();

        assert!(root.history_revisions(&0).unwrap().is_empty());
        assert_eq!(root.history_revisions(&1).unwrap(), vec![2]);
        commit_one(&root, 0, "back");
        assert_eq!(root.get(&0).unwrap(), Some(Doc::new("back")));
    }

    #[test]
    fn time_based_expiry_keeps_fresh_revisions() {
        let root = root();
        root.set_expiry(CacheExpiry::new(TimeBased::new(Duration::from_secs(3600))))
            .unwrap();
        commit_one(&root, 1, "a");
        commit_one(&root, 2, "b");
        assert_eq!(root.retained_revisions().unwrap(), vec![0, 1, 2]);

        root.set_expiry(CacheExpiry::new(TimeBased::new(Duration::ZERO)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(root.expire().unwrap(), 2);
        assert_eq!(root.retained_revisions().unwrap(), vec![2]);
    }

    #[test]
    fn dropped_working_copy_does_not_pin_revisions() {
        let root = seeded(1);
        drop(root.checkout().unwrap());
        commit_one(&root, 5, "x");
        assert_eq!(root.retained_revisions().unwrap(), vec![2]);
    }

    // -----------------------------------------------------------------------
    // Map view
    // -----------------------------------------------------------------------

    #[test]
    fn as_map_snapshots_current_revision() {
        let root = seeded(3);
        let map = root.as_map().unwrap();
        assert_eq!(map.revision(), 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&1), Some(&Doc::default()));

        commit_one(&root, 1, "changed");
        assert_eq!(map.get(&1), Some(&Doc::default()));
        assert!(root.active_copies().unwrap().is_empty());
    }

    #[test]
    fn active_copies_serialize_as_json() {
        let root = seeded(1);
        let wc = root.checkout().unwrap();
        let active = root.active_copies().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, wc.id());

        let json = serde_json::to_string(&active).unwrap();
        let back: Vec<ActiveCheckout> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, active);
        assert!(json.contains("\"revision\":1"));
    }

    #[test]
    fn debug_reports_counts() {
        let root = seeded(2);
        let debug = format!("{root:?}");
        assert!(debug.contains("revision: 2"));
        assert!(debug.contains("active: 0"));
    }
}
