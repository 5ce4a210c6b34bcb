use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use revcache_types::{Revision, RevisionKeySet};

use crate::error::{CacheError, CacheResult};
use crate::root::RootCache;

/// A read-only snapshot of the root at the revision it was exported at.
///
/// Exports are not registered with the root: they never hold back expiry
/// and closing them has no side effects. Reads are deep clones, cached per
/// key for the life of the export. Once expiry drops the export's revision,
/// keys not read yet may no longer be resolvable.
pub struct ReadOnlyCopy<'r, K, V> {
    root: &'r RootCache<K, V>,
    base: Arc<RevisionKeySet<K>>,
    cache: HashMap<K, V>,
}

impl<'r, K, V> ReadOnlyCopy<'r, K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(root: &'r RootCache<K, V>, base: Arc<RevisionKeySet<K>>) -> Self {
        Self {
            root,
            base,
            cache: HashMap::new(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.base.revision()
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.base.contains(key)
    }

    pub fn keys(&self) -> &[K] {
        self.base.keys()
    }

    pub fn get(&mut self, key: &K) -> CacheResult<Option<&V>> {
        if !self.base.contains(key) {
            return Ok(None);
        }
        if !self.cache.contains_key(key) {
            let revision = self.base.revision();
            let value = self.root.get_at(revision, key)?.ok_or_else(|| {
                CacheError::InvariantViolated(format!(
                    "revision {revision} lists the key but no value is retained for it"
                ))
            })?;
            self.cache.insert(key.clone(), value);
        }
        Ok(self.cache.get(key))
    }

    /// Release the snapshot. Nothing is reported to the root.
    pub fn close(self) {}
}

impl<K, V> fmt::Debug for ReadOnlyCopy<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyCopy")
            .field("revision", &self.base.revision())
            .field("size", &self.base.size())
            .field("cached", &self.cache.len())
            .finish()
    }
}
