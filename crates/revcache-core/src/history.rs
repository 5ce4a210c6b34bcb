//! Per-key revision history.
//!
//! A [`KeyHistory`] is the ordered record of every change committed for one
//! key. Point-in-time lookups pick an entry according to a
//! [`LookupStrategy`]; revisions with no resident entry fall through to the
//! root's [`ExpirationSink`].

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tracing::trace;

use revcache_expiry::ExpirationSink;
use revcache_types::{Revision, RevisionEntry};

/// Which entry answers a lookup at a revision with no exact entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    /// The oldest entry recorded before the revision.
    ///
    /// Compatible with pojomvcc, where this is the only behaviour. For a key
    /// that changed more than once it can return a value older than the one
    /// that was live at the requested revision.
    #[default]
    EarliestPrior,
    /// The most recent entry recorded before the revision.
    LatestPrior,
}

/// A value visible at some revision.
///
/// Either borrowed from the resident history or re-hydrated from the
/// expiration sink.
#[derive(Debug)]
pub enum Visible<'a, V> {
    Resident(&'a V),
    Retrieved(V),
}

impl<V> Deref for Visible<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        match self {
            Self::Resident(value) => value,
            Self::Retrieved(value) => value,
        }
    }
}

/// Ordered history of one key, keyed by revision.
#[derive(Clone, Debug)]
pub struct KeyHistory<K, V> {
    key: K,
    entries: BTreeMap<Revision, RevisionEntry<K, V>>,
}

impl<K: Clone, V> KeyHistory<K, V> {
    /// An empty history for `key`.
    pub fn new(key: K) -> Self {
        Self {
            key,
            entries: BTreeMap::new(),
        }
    }

    pub fn record_added(&mut self, revision: Revision, value: V) {
        self.insert(RevisionEntry::added(self.key.clone(), value, revision));
    }

    pub fn record_modified(&mut self, revision: Revision, value: V) {
        self.insert(RevisionEntry::modified(self.key.clone(), value, revision));
    }

    pub fn record_deleted(&mut self, revision: Revision) {
        self.insert(RevisionEntry::deleted(self.key.clone(), revision));
    }

    fn insert(&mut self, entry: RevisionEntry<K, V>) {
        self.entries.insert(entry.revision(), entry);
    }
}

impl<K, V> KeyHistory<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The value of the most recent entry, `None` if that entry is a
    /// tombstone or the history is empty.
    pub fn leading(&self) -> Option<&V> {
        self.head().and_then(|entry| entry.value().ok())
    }

    /// Returns `true` if the most recent entry is a tombstone.
    pub fn is_deleted_at_head(&self) -> bool {
        self.head().is_some_and(RevisionEntry::is_tombstone)
    }

    /// Revision of the most recent entry.
    pub fn last_revision(&self) -> Option<Revision> {
        self.entries.keys().next_back().copied()
    }

    pub fn contains_revision(&self, revision: Revision) -> bool {
        self.entries.contains_key(&revision)
    }

    /// The entry recorded exactly at `revision`.
    pub fn entry_at(&self, revision: Revision) -> Option<&RevisionEntry<K, V>> {
        self.entries.get(&revision)
    }

    /// Revision of the entry a lookup at `revision` would use.
    pub fn visible_revision(&self, revision: Revision, strategy: LookupStrategy) -> Option<Revision> {
        self.select(revision, strategy).map(RevisionEntry::revision)
    }

    /// The value visible at `revision`.
    ///
    /// An exact entry wins; otherwise `strategy` picks among the earlier
    /// entries. With no candidate at all, `sink` gets a chance to re-hydrate
    /// the entry. Tombstones yield `None`.
    pub fn get_at<'a>(
        &'a self,
        revision: Revision,
        strategy: LookupStrategy,
        sink: &dyn ExpirationSink<K, V>,
    ) -> Option<Visible<'a, V>> {
        match self.select(revision, strategy) {
            Some(entry) => entry.value().ok().map(Visible::Resident),
            None => sink
                .retrieve(&self.key, revision)
                .and_then(RevisionEntry::into_value)
                .map(Visible::Retrieved),
        }
    }

    /// Drop entries at or below `revision` that no longer matter.
    ///
    /// An entry survives if it is the most recent one or if a lookup at any
    /// of the `protected` revisions would select it. A history left holding
    /// only a tombstone is emptied. Returns the number of entries removed.
    pub fn prune_at(
        &mut self,
        revision: Revision,
        strategy: LookupStrategy,
        protected: &BTreeSet<Revision>,
    ) -> usize {
        let latest = self.last_revision();
        let observed: BTreeSet<Revision> = protected
            .iter()
            .filter_map(|p| self.visible_revision(*p, strategy))
            .collect();
        let doomed: Vec<Revision> = self
            .entries
            .range(..=revision)
            .map(|(r, _)| *r)
            .filter(|r| Some(*r) != latest && !observed.contains(r))
            .collect();
        for r in &doomed {
            self.entries.remove(r);
        }

        let mut removed = doomed.len();
        if self.entries.len() == 1 && self.is_deleted_at_head() {
            self.entries.clear();
            removed += 1;
        }
        if removed > 0 {
            trace!(revision, removed, remaining = self.entries.len(), "pruned key history");
        }
        removed
    }

    /// Remove the entries at the given revisions, if present.
    pub fn remove_revisions(&mut self, revisions: &[Revision]) -> usize {
        revisions
            .iter()
            .filter(|r| self.entries.remove(*r).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in revision order.
    pub fn iter(&self) -> btree_map::Values<'_, Revision, RevisionEntry<K, V>> {
        self.entries.values()
    }

    /// Revisions with a resident entry, ascending.
    pub fn revisions(&self) -> Vec<Revision> {
        self.entries.keys().copied().collect()
    }

    fn head(&self) -> Option<&RevisionEntry<K, V>> {
        self.entries.values().next_back()
    }

    fn select(&self, revision: Revision, strategy: LookupStrategy) -> Option<&RevisionEntry<K, V>> {
        if let Some(entry) = self.entries.get(&revision) {
            return Some(entry);
        }
        let mut prior = self.entries.range(..revision).map(|(_, entry)| entry);
        match strategy {
            LookupStrategy::EarliestPrior => prior.next(),
            LookupStrategy::LatestPrior => prior.next_back(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a KeyHistory<K, V> {
    type Item = &'a RevisionEntry<K, V>;
    type IntoIter = btree_map::Values<'a, Revision, RevisionEntry<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
