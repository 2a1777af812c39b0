//! Structured job logging utilities.
//!
//! Every line carries the job id, owner and operation so one job can be
//! followed through the worker logs.

use tracing::{error, info, warn, Span};
use vframe_models::{JobId, OwnerId};

/// Operation name attached to frame extraction jobs.
pub const FRAME_EXTRACTION: &str = "frame_extraction";

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    owner_id: OwnerId,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: JobId, owner_id: OwnerId, operation: &str) -> Self {
        Self {
            job_id,
            owner_id,
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Tracing span covering one job run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            owner_id = %self.owner_id,
            operation = %self.operation
        )
    }
}
