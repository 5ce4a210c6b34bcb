use thiserror::Error;

use crate::Revision;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("entry at revision {revision} is a tombstone and carries no value")]
    Tombstone { revision: Revision },

    #[error("invalid refresh options: {0}")]
    InvalidRefreshOptions(String),
}
