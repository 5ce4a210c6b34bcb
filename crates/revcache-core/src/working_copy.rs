//! Mutable working copies checked out from a [`RootCache`].
//!
//! A [`WorkingCopy`] is pinned to the revision it was checked out at. Reads
//! go through to the root once per key and are cached as deep clones;
//! additions, replacements and removals stay local until the copy is
//! committed. A working copy is single-owner and not meant to be shared
//! between threads.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use revcache_types::{RefreshFlags, RefreshOptions, Revision, RevisionKeySet, UpdateMode};

use crate::change_set::ChangeSet;
use crate::error::{CacheError, CacheResult};
use crate::root::RootCache;

/// Identifier of a registered working copy, unique per root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckoutId(u64);

impl CheckoutId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wc-{}", self.0)
    }
}

/// A checked-out, mutable view of the root at a fixed revision.
///
/// Close it with [`WorkingCopy::close`] so the root can expire revisions no
/// longer in use. Dropping it without closing still unregisters it, but
/// does not run expiry.
pub struct WorkingCopy<'r, K, V> {
    root: &'r RootCache<K, V>,
    id: CheckoutId,
    changes: ChangeSet<K, V>,
    released: bool,
}

impl<'r, K, V> WorkingCopy<'r, K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(root: &'r RootCache<K, V>, id: CheckoutId, base: Arc<RevisionKeySet<K>>) -> Self {
        Self {
            root,
            id,
            changes: ChangeSet::new(base),
            released: false,
        }
    }

    pub fn id(&self) -> CheckoutId {
        self.id
    }

    /// The base revision this copy was checked out at.
    pub fn revision(&self) -> Revision {
        self.changes.revision()
    }

    /// The staged changes.
    pub fn changes(&self) -> &ChangeSet<K, V> {
        &self.changes
    }

    pub fn size(&self) -> usize {
        self.changes.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.changes.contains_key(key)
    }

    /// Visible keys: base keys minus removals, then additions.
    pub fn keys(&self) -> Vec<K> {
        self.changes.keys()
    }

    pub fn added(&self) -> &[K] {
        self.changes.added()
    }

    /// Keys read or replaced through this copy.
    pub fn modified(&self) -> &[K] {
        self.changes.modified()
    }

    pub fn removed(&self) -> &[K] {
        self.changes.removed()
    }

    pub fn is_added(&self, key: &K) -> bool {
        self.changes.is_added(key)
    }

    pub fn is_modified(&self, key: &K) -> bool {
        self.changes.is_modified(key)
    }

    pub fn is_removed(&self, key: &K) -> bool {
        self.changes.is_removed(key)
    }

    /// The value of `key` as seen by this copy.
    ///
    /// The first read of a base key fetches a deep clone from the root and
    /// marks the key modified; later reads return the same clone. Removed
    /// keys and keys unknown at the base revision yield `None`.
    pub fn get(&mut self, key: &K) -> CacheResult<Option<&mut V>> {
        if self.changes.is_removed(key) {
            return Ok(None);
        }
        if self.changes.holds(key) {
            return Ok(self.changes.local_mut(key));
        }
        if !self.changes.base().contains(key) {
            return Ok(None);
        }
        let revision = self.revision();
        let value = self.root.get_at(revision, key)?.ok_or_else(|| {
            CacheError::InvariantViolated(format!(
                "revision {revision} lists the key but no value is retained for it"
            ))
        })?;
        Ok(Some(self.changes.hold_read(key.clone(), value)))
    }

    /// The value at position `index` of [`WorkingCopy::keys`].
    pub fn get_index(&mut self, index: usize) -> CacheResult<Option<&mut V>> {
        match self.changes.key_at(index).cloned() {
            Some(key) => self.get(&key),
            None => Ok(None),
        }
    }

    /// Position of `key` in [`WorkingCopy::keys`].
    pub fn key_index(&self, key: &K) -> Option<usize> {
        self.changes.key_index(key)
    }

    /// Stage `value` as a new key. Committing fails if the key already
    /// exists in the root.
    pub fn add(&mut self, key: K, value: V) {
        self.changes.add(key, value);
    }

    /// Stage `value` as the new value of an existing key.
    pub fn replace(&mut self, key: K, value: V) -> CacheResult<()> {
        self.changes.replace(key, value)
    }

    /// Stage the removal of `key`. Returns `false` if already removed.
    pub fn remove(&mut self, key: &K) -> CacheResult<bool> {
        self.changes.remove(key)
    }

    /// Discard all staged changes and held clones.
    pub fn revert(&mut self) {
        self.changes.revert();
    }

    /// A cursor over `(key, value)` pairs in [`WorkingCopy::keys`] order.
    pub fn cursor(&self) -> ValueCursor {
        ValueCursor {
            version: self.changes.version(),
            base_pos: 0,
            added_pos: 0,
        }
    }

    /// Reconcile staged changes with commits made to the root since the
    /// base revision.
    ///
    /// Every staged key the root still holds at its current revision is a
    /// conflict, whether or not it changed after the base revision. All
    /// conflicts are checked against the `fail_on_*` switches before anything
    /// is applied. Modified keys are then refreshed according to
    /// [`RefreshOptions::mode`]. The base revision does not move and keys only
    /// present in the root are not pulled in.
    pub fn update(&mut self, options: &RefreshOptions) -> CacheResult<()> {
        let staged: Vec<K> = self
            .changes
            .added()
            .iter()
            .chain(self.changes.modified())
            .chain(self.changes.removed())
            .cloned()
            .collect();
        if staged.is_empty() {
            return Ok(());
        }

        let base = self.revision();
        let live = self.root.live_values(&staged)?;

        for (key, _) in &live {
            if self.changes.is_added(key) && options.fail_on_add_conflict() {
                return Err(conflict("added", base));
            }
            if self.changes.is_modified(key) && options.fail_on_modify_conflict() {
                return Err(conflict("modified", base));
            }
            if self.changes.is_removed(key) && options.fail_on_remove_conflict() {
                return Err(conflict("removed", base));
            }
        }

        let conflicts = live.len();
        let factory = self.root.factory()?;
        let mut refreshed = 0usize;
        for (key, root_value) in live {
            if !self.changes.is_modified(&key) {
                continue;
            }
            let value = match options.mode() {
                UpdateMode::Merge => match self.changes.local(&key) {
                    Some(local) => factory.merge(&root_value, local),
                    None => continue,
                },
                UpdateMode::Replace => root_value,
                UpdateMode::Ignore => continue,
            };
            self.changes.set_local(key, value);
            refreshed += 1;
        }

        debug!(
            checkout = %self.id,
            revision = base,
            conflicts,
            refreshed,
            "updated working copy"
        );
        Ok(())
    }

    /// [`WorkingCopy::update`] with options given as raw flags.
    pub fn update_with_flags(&mut self, flags: RefreshFlags) -> CacheResult<()> {
        let options = RefreshOptions::try_from(flags)?;
        self.update(&options)
    }

    /// Unregister from the root and run an expiry pass.
    pub fn close(self) -> CacheResult<()> {
        let root = self.root;
        root.close(self)
    }
}

impl<'r, K, V> WorkingCopy<'r, K, V> {
    pub(crate) fn root(&self) -> &'r RootCache<K, V> {
        self.root
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
    }
}

impl<K, V> Drop for WorkingCopy<'_, K, V> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.root.release(self.id) {
            warn!(checkout = %self.id, error = %err, "failed to release dropped working copy");
        }
    }
}

impl<K, V> fmt::Debug for WorkingCopy<'_, K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("id", &self.id)
            .field("revision", &self.changes.revision())
            .field("added", &self.changes.added().len())
            .field("modified", &self.changes.modified().len())
            .field("removed", &self.changes.removed().len())
            .finish()
    }
}

fn conflict(kind: &str, base: Revision) -> CacheError {
    CacheError::InvariantViolated(format!(
        "root still holds a key {kind} in this working copy (base revision {base})"
    ))
}

/// Walks a working copy's values, failing if the copy changes underneath.
///
/// The cursor does not borrow the working copy between steps; each call to
/// [`ValueCursor::next`] takes it explicitly and checks its version stamp.
#[derive(Clone, Debug)]
pub struct ValueCursor {
    version: u64,
    base_pos: usize,
    added_pos: usize,
}

impl ValueCursor {
    /// The next `(key, value)` pair, or `None` when exhausted.
    ///
    /// Fails with [`CacheError::ConcurrentModification`] if the working copy
    /// was mutated since the cursor was created.
    pub fn next<'w, K, V>(
        &mut self,
        wc: &'w mut WorkingCopy<'_, K, V>,
    ) -> CacheResult<Option<(K, &'w mut V)>>
    where
        K: Eq + Hash + Clone,
    {
        if wc.changes.version() != self.version {
            return Err(CacheError::ConcurrentModification);
        }
        let key = loop {
            if let Some(key) = wc.changes.base().keys().get(self.base_pos) {
                self.base_pos += 1;
                if wc.changes.is_removed(key) {
                    continue;
                }
                break key.clone();
            }
            match wc.changes.added().get(self.added_pos) {
                Some(key) => {
                    self.added_pos += 1;
                    break key.clone();
                }
                None => return Ok(None),
            }
        };
        match wc.get(&key)? {
            Some(value) => Ok(Some((key, value))),
            None => Err(CacheError::InvariantViolated(
                "cursor reached a key without a visible value".into(),
            )),
        }
    }
}
