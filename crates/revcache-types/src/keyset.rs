use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::temporal::now_ms;
use crate::Revision;

/// The set of keys live at a single revision of the root.
///
/// A key set is created exactly once per successful commit and never
/// mutated afterwards. Key order is the order in which keys entered the
/// timeline. The creation time is captured at construction and is what
/// time-based expiry policies compare against.
///
/// Equality and hashing use the revision alone.
#[derive(Clone)]
pub struct RevisionKeySet<K> {
    revision: Revision,
    timestamp_ms: u64,
    keys: Vec<K>,
    index: HashSet<K>,
}

impl<K> RevisionKeySet<K>
where
    K: Eq + Hash + Clone,
{
    /// An empty key set for `revision`, stamped with the current time.
    pub fn new(revision: Revision) -> Self {
        Self::with_timestamp(revision, now_ms(), Vec::new())
    }

    /// A key set for `revision` holding `keys`, stamped with the current time.
    pub fn with_keys(revision: Revision, keys: Vec<K>) -> Self {
        Self::with_timestamp(revision, now_ms(), keys)
    }

    /// A key set for `revision` holding a copy of `other`'s keys.
    ///
    /// The new set gets its own creation time.
    pub fn derived(revision: Revision, other: &RevisionKeySet<K>) -> Self {
        Self::with_keys(revision, other.keys.clone())
    }

    /// A key set with an explicit creation time (milliseconds since epoch).
    pub fn with_timestamp(revision: Revision, timestamp_ms: u64, keys: Vec<K>) -> Self {
        let index = keys.iter().cloned().collect();
        Self {
            revision,
            timestamp_ms,
            keys,
            index,
        }
    }

    /// Returns `true` if `key` is live at this revision.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains(key)
    }
}

impl<K> RevisionKeySet<K> {
    /// The revision these keys belong to.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Creation time in milliseconds since the UNIX epoch.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// The live keys, in timeline order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Number of live keys.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no key is live at this revision.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over the live keys in timeline order.
    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.keys.iter()
    }
}

impl<K> PartialEq for RevisionKeySet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision
    }
}

impl<K> Eq for RevisionKeySet<K> {}

impl<K> Hash for RevisionKeySet<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.revision.hash(state);
    }
}

impl<K> fmt::Debug for RevisionKeySet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionKeySet")
            .field("revision", &self.revision)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("size", &self.keys.len())
            .finish()
    }
}

impl<'a, K> IntoIterator for &'a RevisionKeySet<K> {
    type Item = &'a K;
    type IntoIter = std::slice::Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set() {
        let set: RevisionKeySet<u32> = RevisionKeySet::new(0);
        assert_eq!(set.revision(), 0);
        assert_eq!(set.size(), 0);
        assert!(set.is_empty());
        assert!(set.timestamp_ms() > 0);
    }

    #[test]
    fn keys_keep_order_and_index() {
        let set = RevisionKeySet::with_keys(4, vec![3, 1, 2]);
        assert_eq!(set.keys(), &[3, 1, 2]);
        assert!(set.contains(&1));
        assert!(!set.contains(&9));
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn derived_copies_keys_under_new_revision() {
        let base = RevisionKeySet::with_keys(1, vec!["a", "b"]);
        let next = RevisionKeySet::derived(2, &base);
        assert_eq!(next.revision(), 2);
        assert_eq!(next.keys(), base.keys());
        assert_ne!(next, base);
    }

    #[test]
    fn equality_is_by_revision() {
        let a = RevisionKeySet::with_timestamp(5, 10, vec![1, 2]);
        let b = RevisionKeySet::with_timestamp(5, 99, vec![7]);
        assert_eq!(a, b);
    }

    #[test]
    fn debug_shows_size_not_keys() {
        let set = RevisionKeySet::with_timestamp(2, 1000, vec![1, 2, 3]);
        assert_eq!(
            format!("{set:?}"),
            "RevisionKeySet { revision: 2, timestamp_ms: 1000, size: 3 }"
        );
    }
}
