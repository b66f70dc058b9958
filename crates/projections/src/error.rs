//! Projection error types.

use ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur while projecting derived state.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The underlying ledger failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A rebuild stopped part way through.
    #[error("Rebuild aborted after {processed} users: {source}")]
    RebuildAborted {
        processed: usize,
        #[source]
        source: LedgerError,
    },
}

impl ProjectionError {
    /// Returns true if running the projection again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProjectionError::Ledger(e) => e.is_retryable(),
            ProjectionError::RebuildAborted { source, .. } => source.is_retryable(),
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
