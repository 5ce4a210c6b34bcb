//! Staged changes of a working copy.
//!
//! A [`ChangeSet`] tracks what a working copy added, removed and touched
//! (read or replaced) on top of an immutable base key set, together with
//! the locally held values. Every mutation bumps a version stamp that
//! cursors use to detect concurrent modification.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use revcache_types::{Revision, RevisionKeySet};

use crate::error::{CacheError, CacheResult};

/// Insertion-ordered set of keys.
#[derive(Clone, Debug)]
struct OrderedKeys<K> {
    order: Vec<K>,
    index: HashSet<K>,
}

impl<K: Eq + Hash + Clone> OrderedKeys<K> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashSet::new(),
        }
    }

    fn insert(&mut self, key: K) -> bool {
        if !self.index.insert(key.clone()) {
            return false;
        }
        self.order.push(key);
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        if !self.index.remove(key) {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    fn contains(&self, key: &K) -> bool {
        self.index.contains(key)
    }

    fn as_slice(&self) -> &[K] {
        &self.order
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
    }
}

/// Local changes over a base revision.
#[derive(Clone, Debug)]
pub struct ChangeSet<K, V> {
    base: Arc<RevisionKeySet<K>>,
    added: OrderedKeys<K>,
    removed: OrderedKeys<K>,
    touched: OrderedKeys<K>,
    local: HashMap<K, V>,
    version: u64,
}

impl<K, V> ChangeSet<K, V>
where
    K: Eq + Hash + Clone,
{
    /// An empty change set over `base`.
    pub fn new(base: Arc<RevisionKeySet<K>>) -> Self {
        Self {
            base,
            added: OrderedKeys::new(),
            removed: OrderedKeys::new(),
            touched: OrderedKeys::new(),
            local: HashMap::new(),
            version: 0,
        }
    }

    /// The base revision. Fixed for the life of the change set.
    pub fn revision(&self) -> Revision {
        self.base.revision()
    }

    /// The key set of the base revision.
    pub fn base(&self) -> &RevisionKeySet<K> {
        &self.base
    }

    /// Modification stamp, bumped by every mutating call.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stage `value` under `key` as an addition.
    ///
    /// Adding a key twice keeps one membership and the newest value. Adding
    /// back a base key removed earlier turns into a replacement.
    pub fn add(&mut self, key: K, value: V) {
        if self.removed.remove(&key) {
            self.touched.insert(key.clone());
        } else {
            self.added.insert(key.clone());
        }
        self.local.insert(key, value);
        self.version += 1;
    }

    /// Stage `value` as the new value of a base key.
    pub fn replace(&mut self, key: K, value: V) -> CacheResult<()> {
        if self.added.contains(&key) {
            self.local.insert(key, value);
        } else if self.removed.contains(&key) {
            return Err(CacheError::InvariantViolated(
                "cannot replace a key removed in this working copy".into(),
            ));
        } else if self.base.contains(&key) {
            self.touched.insert(key.clone());
            self.local.insert(key, value);
        } else {
            return Err(CacheError::InvariantViolated(format!(
                "cannot replace a key absent at revision {}",
                self.base.revision()
            )));
        }
        self.version += 1;
        Ok(())
    }

    /// Stage the removal of `key`.
    ///
    /// Returns `false` when the key was already removed.
    pub fn remove(&mut self, key: &K) -> CacheResult<bool> {
        if self.added.remove(key) {
            self.local.remove(key);
            self.version += 1;
            return Ok(true);
        }
        if self.removed.contains(key) {
            return Ok(false);
        }
        if !self.base.contains(key) {
            return Err(CacheError::InvariantViolated(format!(
                "cannot remove a key that is neither staged nor present at revision {}",
                self.base.revision()
            )));
        }
        self.removed.insert(key.clone());
        self.touched.remove(key);
        self.local.remove(key);
        self.version += 1;
        Ok(true)
    }

    /// Forget every staged change.
    pub fn revert(&mut self) {
        self.added.clear();
        self.removed.clear();
        self.touched.clear();
        self.local.clear();
        self.version += 1;
    }

    /// Cache a value read through from the root and mark the key touched.
    pub(crate) fn hold_read(&mut self, key: K, value: V) -> &mut V {
        self.touched.insert(key.clone());
        self.local.entry(key).or_insert(value)
    }

    /// Overwrite a held value without changing membership.
    pub(crate) fn set_local(&mut self, key: K, value: V) {
        self.local.insert(key, value);
        self.version += 1;
    }

    pub fn is_added(&self, key: &K) -> bool {
        self.added.contains(key)
    }

    /// Returns `true` if the key was read or replaced.
    pub fn is_modified(&self, key: &K) -> bool {
        self.touched.contains(key)
    }

    pub fn is_removed(&self, key: &K) -> bool {
        self.removed.contains(key)
    }

    /// Staged additions, in staging order.
    pub fn added(&self) -> &[K] {
        self.added.as_slice()
    }

    /// Keys read or replaced, in first-touch order.
    pub fn modified(&self) -> &[K] {
        self.touched.as_slice()
    }

    /// Staged removals, in staging order.
    pub fn removed(&self) -> &[K] {
        self.removed.as_slice()
    }

    pub fn holds(&self, key: &K) -> bool {
        self.local.contains_key(key)
    }

    /// The locally held value for `key`, if any.
    pub fn local(&self, key: &K) -> Option<&V> {
        self.local.get(key)
    }

    pub fn local_mut(&mut self, key: &K) -> Option<&mut V> {
        self.local.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.added.contains(key) || (!self.removed.contains(key) && self.base.contains(key))
    }

    /// Number of keys visible through the change set.
    pub fn size(&self) -> usize {
        (self.base.size() + self.added.len()).saturating_sub(self.removed.len())
    }

    /// Base keys minus removals, followed by additions.
    pub fn keys(&self) -> Vec<K> {
        self.iter_keys().cloned().collect()
    }

    /// The key at position `index` of [`ChangeSet::keys`].
    pub fn key_at(&self, index: usize) -> Option<&K> {
        self.iter_keys().nth(index)
    }

    /// Position of `key` in [`ChangeSet::keys`].
    pub fn key_index(&self, key: &K) -> Option<usize> {
        self.iter_keys().position(|k| k == key)
    }

    /// Returns `true` when nothing is staged.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.touched.is_empty()
    }

    fn iter_keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.base
            .iter()
            .filter(move |k| !self.removed.contains(k))
            .chain(self.added.as_slice())
    }
}
