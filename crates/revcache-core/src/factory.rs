//! Value cloning and merging.

use std::fmt;
use std::marker::PhantomData;

/// Deep-clones and merges cached values.
///
/// The root calls both methods while holding its write lock, so they must be
/// pure and fast and must never call back into the root.
pub trait ElementFactory<V>: Send + Sync {
    /// Produce an independent deep copy of `value`.
    fn clone_element(&self, value: &V) -> V;

    /// Combine the repository's value with a locally changed one.
    ///
    /// The argument order is fixed: repository first, local second.
    fn merge(&self, repository: &V, local: &V) -> V;
}

/// Factory for types whose [`Clone`] is already a deep copy.
///
/// Merging keeps the local value.
pub struct CloneFactory<V> {
    _values: PhantomData<fn() -> V>,
}

impl<V> CloneFactory<V> {
    pub fn new() -> Self {
        Self {
            _values: PhantomData,
        }
    }
}

impl<V> Default for CloneFactory<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for CloneFactory<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for CloneFactory<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CloneFactory")
    }
}

impl<V: Clone> ElementFactory<V> for CloneFactory<V> {
    fn clone_element(&self, value: &V) -> V {
        value.clone()
    }

    fn merge(&self, _repository: &V, local: &V) -> V {
        local.clone()
    }
}
