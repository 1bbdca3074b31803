//! Error types for reconciliation bookkeeping.

use thiserror::Error;

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A time computation fell outside the representable range.
    #[error("time out of range while computing {0}")]
    TimeOverflow(&'static str),
}
