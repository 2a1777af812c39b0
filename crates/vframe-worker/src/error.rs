//! Worker error types.
//!
//! Job-level failures (bad input, ffmpeg errors, archive errors) are recorded
//! in the ledger and never surface here. A `WorkerError` means the job could
//! not be settled and its message must be redelivered.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job cancelled before completion")]
    Cancelled,

    #[error("Ledger error: {0}")]
    Ledger(#[from] vframe_ledger::LedgerError),

    #[error("Queue error: {0}")]
    Queue(#[from] vframe_queue::QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use vframe_models::JobId;

    #[test]
    fn test_ledger_errors_convert() {
        let err: WorkerError = vframe_ledger::LedgerError::NotFound(JobId(3)).into();
        assert!(matches!(err, WorkerError::Ledger(_)));
        assert!(err.to_string().contains('3'));
    }
}
