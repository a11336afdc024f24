//! Error types for progression operations

use thiserror::Error;

use crate::db::StoreError;

/// Failure of a progression call.
///
/// A failed `apply_update` does not say whether the write landed; callers
/// re-read with `get_or_init_progress` to reconcile.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Missing or empty user identifier
    #[error("user id is missing or empty")]
    InvalidUser,

    /// Malformed field in an update payload
    #[error("invalid update field `{field}`: {reason}")]
    InvalidUpdate { field: String, reason: String },

    /// Document store I/O failed
    #[error("progress store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ProgressError {
    pub(crate) fn invalid_update(field: &str, reason: impl Into<String>) -> Self {
        ProgressError::InvalidUpdate {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProgressError>;
