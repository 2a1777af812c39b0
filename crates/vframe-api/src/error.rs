//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use vframe_ledger::LedgerError;
use vframe_queue::QueueError;
use vframe_storage::StorageError;

use crate::services::{RetrievalError, SubmissionError};

pub type ApiResult<T> = Result<T, ApiError>;

pub const JOB_NOT_FOUND: &str = "job not found";
pub const JOB_NOT_COMPLETED: &str = "job not completed";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) | ApiError::Ledger(_) | ApiError::Storage(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Client-facing message.
    fn detail(&self) -> String {
        match self {
            ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Gone(msg)
            | ApiError::BadRequest(msg)
            | ApiError::PayloadTooLarge(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SubmissionError::Storage(StorageError::InvalidInput(msg)) => ApiError::BadRequest(msg),
            SubmissionError::Storage(e) => ApiError::Storage(e),
            SubmissionError::Ledger(LedgerError::InvalidInput(msg)) => ApiError::BadRequest(msg),
            SubmissionError::Ledger(e) => ApiError::Ledger(e),
            SubmissionError::Enqueue(e) => ApiError::Queue(e),
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::NotFound(_) => ApiError::not_found(JOB_NOT_FOUND),
            RetrievalError::Forbidden(job_id) => {
                debug!(job_id = %job_id, "Rejected access to another owner's job");
                ApiError::not_found(JOB_NOT_FOUND)
            }
            RetrievalError::NotCompleted { .. } => ApiError::not_found(JOB_NOT_COMPLETED),
            RetrievalError::ArtifactMissing(job_id) => {
                ApiError::Gone(format!("archive for job {} is no longer available", job_id))
            }
            RetrievalError::Ledger(e) => ApiError::Ledger(e),
            RetrievalError::Storage(e) => ApiError::Storage(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal() {
            error!("Request failed: {}", self);
            if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                "An internal error occurred".to_string()
            } else {
                self.detail()
            }
        } else {
            self.detail()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vframe_models::{JobId, JobStatus};

    #[test]
    fn test_forbidden_is_indistinguishable_from_missing() {
        let missing = ApiError::from(RetrievalError::NotFound(JobId(1)));
        let foreign = ApiError::from(RetrievalError::Forbidden(JobId(1)));

        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(foreign.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.detail(), foreign.detail());
        assert_eq!(foreign.detail(), JOB_NOT_FOUND);
    }

    #[test]
    fn test_retrieval_mapping() {
        let pending = ApiError::from(RetrievalError::NotCompleted {
            job_id: JobId(1),
            status: JobStatus::Processing,
        });
        assert_eq!(pending.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(pending.detail(), JOB_NOT_COMPLETED);

        let gone = ApiError::from(RetrievalError::ArtifactMissing(JobId(1)));
        assert_eq!(gone.status_code(), StatusCode::GONE);
    }

    #[test]
    fn test_submission_mapping() {
        let invalid = ApiError::from(SubmissionError::InvalidInput("empty".into()));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let queue = ApiError::from(SubmissionError::Enqueue(QueueError::enqueue_failed("down")));
        assert_eq!(queue.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let disk = ApiError::from(SubmissionError::Storage(StorageError::upload_failed("disk full")));
        assert_eq!(disk.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
