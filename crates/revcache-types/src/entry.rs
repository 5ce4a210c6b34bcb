use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::Revision;

/// Kind of change a [`RevisionEntry`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The key was introduced at this revision.
    Added,
    /// The key's value was replaced at this revision.
    Modified,
    /// The key was removed at this revision (tombstone).
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "Added"),
            Self::Modified => write!(f, "Modified"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

/// One historical record of a key at a single revision.
///
/// Entries are immutable once created. A [`ChangeKind::Deleted`] entry is a
/// tombstone and never carries a value; the constructors enforce this.
///
/// Two entries are equal when they have the same key, revision and kind.
/// The value does not take part in equality or hashing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevisionEntry<K, V> {
    key: K,
    value: Option<V>,
    kind: ChangeKind,
    revision: Revision,
}

impl<K, V> RevisionEntry<K, V> {
    /// Record `value` as introduced at `revision`.
    pub fn added(key: K, value: V, revision: Revision) -> Self {
        Self {
            key,
            value: Some(value),
            kind: ChangeKind::Added,
            revision,
        }
    }

    /// Record `value` as the replacement value at `revision`.
    pub fn modified(key: K, value: V, revision: Revision) -> Self {
        Self {
            key,
            value: Some(value),
            kind: ChangeKind::Modified,
            revision,
        }
    }

    /// Record a tombstone for `key` at `revision`.
    pub fn deleted(key: K, revision: Revision) -> Self {
        Self {
            key,
            value: None,
            kind: ChangeKind::Deleted,
            revision,
        }
    }

    /// The key this entry belongs to.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The revision this entry was recorded at.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// The kind of change recorded.
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Returns `true` if this entry is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }

    /// The recorded value.
    ///
    /// Fails with [`TypeError::Tombstone`] for deleted entries.
    pub fn value(&self) -> Result<&V, TypeError> {
        self.value.as_ref().ok_or(TypeError::Tombstone {
            revision: self.revision,
        })
    }

    /// Consume the entry, returning its value (`None` for tombstones).
    pub fn into_value(self) -> Option<V> {
        self.value
    }
}

impl<K: PartialEq, V> PartialEq for RevisionEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision && self.kind == other.kind && self.key == other.key
    }
}

impl<K: Eq, V> Eq for RevisionEntry<K, V> {}

impl<K: Hash, V> Hash for RevisionEntry<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.revision.hash(state);
        self.kind.hash(state);
    }
}
