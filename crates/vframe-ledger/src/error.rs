//! Ledger error types.

use thiserror::Error;
use vframe_models::{InvalidTransition, JobId};

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt job row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn corrupt_row(msg: impl Into<String>) -> Self {
        Self::CorruptRow(msg.into())
    }

    /// True when the write was rejected because the job already moved on.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, LedgerError::InvalidTransition(_))
    }
}
