use revcache_types::{Revision, TypeError};

/// Errors from root and working copy operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A caller broke a precondition of the operation.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// The revision lies in the future or has been expired.
    #[error("revision {revision} out of range: {reason}")]
    OutOfRange { revision: Revision, reason: String },

    /// The working copy changed while a cursor was walking it.
    #[error("working copy was modified during iteration")]
    ConcurrentModification,

    /// A thread panicked while holding the root lock.
    #[error("root lock poisoned")]
    LockPoisoned,

    /// Configuration could not be parsed or applied.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<TypeError> for CacheError {
    fn from(err: TypeError) -> Self {
        Self::InvariantViolated(err.to_string())
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
