//! Job status state machine.
//!
//! Status only moves forward: `Pending -> Processing -> {Completed, Failed}`.
//! `Pending -> Failed` is reserved for submissions whose queue publish failed,
//! and `Processing -> Processing` lets a redelivered message re-mark its job.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is stored and waiting for a worker
    #[default]
    Pending,
    /// Job is actively being processed
    Processing,
    /// Archive produced
    Completed,
    /// Job failed with an error detail
    Failed,
}

/// Rejected status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl JobStatus {
    /// Get string representation of the status, as persisted in the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Validate a transition, returning the target status.
    pub fn transition_to(self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }

    /// Statuses from which `next` may be reached.
    pub fn sources_of(next: JobStatus) -> &'static [JobStatus] {
        use JobStatus::*;
        match next {
            Pending => &[],
            Processing => &[Pending, Processing],
            Completed => &[Processing],
            Failed => &[Pending, Processing],
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(ParseJobStatusError(s.to_string())),
        }
    }
}
