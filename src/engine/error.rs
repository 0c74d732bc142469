//! engine::error
//!
//! Run-level error taxonomy.
//!
//! Every variant here aborts the run. Recoverable outcomes (an aborted
//! rebase, a failed label request) are recorded in the
//! [`StatusReport`](crate::core::status::StatusReport) instead.

use thiserror::Error;

use crate::core::cleanup::CleanupError;
use crate::core::config::ConfigError;
use crate::core::refname::RefNameError;
use crate::forge::ForgeError;
use crate::git::GitError;

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing credentials, unusable working repository, or a branch that
    /// would push to the wrong remote.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The integration branch name cannot be normalized.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required ref could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal bound was exhausted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A forge check did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),
}

impl From<RefNameError> for SyncError {
    fn from(err: RefNameError) -> Self {
        SyncError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refname_errors_are_invalid_input() {
        let err: SyncError = RefNameError::InvalidInput("''".into()).into();
        assert!(matches!(err, SyncError::InvalidInput(_)));
    }

    #[test]
    fn wrapped_errors_display_transparently() {
        let err: SyncError = ForgeError::RateLimited.into();
        assert_eq!(err.to_string(), "rate limited");
    }
}
