//! Read-only map view of a single revision.

use std::collections::HashMap;
use std::hash::Hash;

use revcache_types::Revision;

/// A materialized, read-only snapshot of one revision.
///
/// Values are deep clones owned by the map. Iteration follows the key order
/// of the revision.
#[derive(Clone, Debug)]
pub struct CacheMap<K, V> {
    revision: Revision,
    order: Vec<K>,
    entries: HashMap<K, V>,
}

impl<K, V> CacheMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(revision: Revision, pairs: Vec<(K, V)>) -> Self {
        let order = pairs.iter().map(|(k, _)| k.clone()).collect();
        Self {
            revision,
            order,
            entries: pairs.into_iter().collect(),
        }
    }

    /// The revision this snapshot was taken at.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> std::slice::Iter<'_, K> {
        self.order.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            keys: self.order.iter(),
            entries: &self.entries,
        }
    }

    /// Unwrap into the underlying `HashMap`.
    pub fn into_inner(self) -> HashMap<K, V> {
        self.entries
    }
}

/// Iterator over a [`CacheMap`] in key order.
pub struct Iter<'a, K, V> {
    keys: std::slice::Iter<'a, K>,
    entries: &'a HashMap<K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Eq + Hash,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries;
        self.keys
            .by_ref()
            .find_map(|key| entries.get(key).map(|value| (key, value)))
    }
}

impl<'a, K, V> IntoIterator for &'a CacheMap<K, V>
where
    K: Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
