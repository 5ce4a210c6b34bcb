//! Multi-version object cache with a Subversion-like workflow.
//!
//! A [`RootCache`] holds the authoritative revision timeline. Callers check
//! out a [`WorkingCopy`] at the current revision, change it locally and
//! commit it back as the next revision. Values are never shared: the root
//! hands out deep clones produced by an [`ElementFactory`], so mutating a
//! value read from one working copy never affects another or the root.
//!
//! Old revisions are dropped by the root's expiry policy (see
//! [`revcache_expiry`]) while any revision still used by an open working
//! copy is retained.
//!
//! # Key Types
//!
//! - [`RootCache`] -- The shared store: commit, checkout, export, expiry
//! - [`WorkingCopy`] -- Mutable, single-owner view pinned at a revision
//! - [`ReadOnlyCopy`] -- Unregistered read-only snapshot
//! - [`ChangeSet`] -- Staged additions, modifications and removals
//! - [`KeyHistory`] -- Per-key revision history and point-in-time lookup
//! - [`CacheMap`] -- Materialized map view of the current revision
//! - [`RootConfig`] -- Serde-backed root configuration

pub mod change_set;
pub mod config;
pub mod error;
pub mod export;
pub mod factory;
pub mod history;
pub mod map;
pub mod root;
pub mod working_copy;

pub use change_set::ChangeSet;
pub use config::RootConfig;
pub use error::{CacheError, CacheResult};
pub use export::ReadOnlyCopy;
pub use factory::{CloneFactory, ElementFactory};
pub use history::{KeyHistory, LookupStrategy, Visible};
pub use map::CacheMap;
pub use root::{ActiveCheckout, RootCache};
pub use working_copy::{CheckoutId, ValueCursor, WorkingCopy};

pub use revcache_expiry::{CacheExpiry, ExpiryConfig};
pub use revcache_types::{RefreshFlags, RefreshOptions, Revision, UpdateMode};
