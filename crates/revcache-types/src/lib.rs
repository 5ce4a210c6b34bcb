//! Foundation types for revcache.
//!
//! revcache is an in-memory, multi-version object store with a
//! Subversion-like workflow: a shared root holds the revision timeline,
//! callers check out working copies, change them locally, and commit the
//! result as a new revision. This crate provides the plain data types every
//! other revcache crate shares.
//!
//! # Key Types
//!
//! - [`Revision`] -- Monotonic revision number of the root timeline
//! - [`ChangeKind`] -- Added / Modified / Deleted marker of a history entry
//! - [`RevisionEntry`] -- One historical record of a key at a revision
//! - [`RevisionKeySet`] -- The keys live at a revision, with creation time
//! - [`RefreshOptions`] -- Conflict handling when updating a working copy

pub mod entry;
pub mod error;
pub mod keyset;
pub mod options;
pub mod temporal;

pub use entry::{ChangeKind, RevisionEntry};
pub use error::TypeError;
pub use keyset::RevisionKeySet;
pub use options::{RefreshFlags, RefreshOptions, UpdateMode};
pub use temporal::now_ms;

/// Revision number of the root timeline.
///
/// Revision `0` is the empty initial revision; every successful commit
/// advances the counter by exactly one.
pub type Revision = u64;
