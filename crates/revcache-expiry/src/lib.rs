//! Expiry of revision history for revcache.
//!
//! A root keeps one [`RevisionKeySet`] per retained revision plus the history
//! entries those revisions need. Expiry decides which key sets can be dropped
//! and where dropped revisions go. Both decisions are pluggable:
//!
//! - [`ExpiryPolicy`] -- when to run and which key sets to drop
//! - [`ExpirationSink`] -- offload target for dropped key sets, and the place
//!   history lookups turn to when a revision is no longer resident
//!
//! A policy only sees the root through [`ExpiryContext`], a read-only view
//! handed to it while the root's write lock is held. Policies and sinks must
//! therefore be fast and must never call back into the root.
//!
//! # Provided Implementations
//!
//! - [`Never`], [`NoLongerUsed`], [`TimeBased`] -- canonical policies
//! - [`NoopSink`], [`RecordingSink`] -- sinks
//! - [`CacheExpiry`] -- the policy/sink pair a root is configured with
//! - [`ExpiryConfig`] -- serde-friendly description of a [`CacheExpiry`]
//!
//! [`RevisionKeySet`]: revcache_types::RevisionKeySet

pub mod config;
pub mod expiry;
pub mod policy;
pub mod sink;
pub mod traits;

pub use config::ExpiryConfig;
pub use expiry::CacheExpiry;
pub use policy::{Never, NoLongerUsed, TimeBased};
pub use sink::{NoopSink, RecordingSink};
pub use traits::{ExpirationSink, ExpiryContext, ExpiryPolicy};
