//! Job records tracked by the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::JobStatus;

/// Ledger-assigned job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identity of the user who submitted a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One submitted video's processing lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub original_filename: String,
    pub status: JobStatus,
    /// Archive path, set only when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    /// Failure detail, set only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(id: JobId, owner_id: OwnerId, original_filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            original_filename: original_filename.into(),
            status: JobStatus::Pending,
            result_path: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_owned_by(&self, owner: OwnerId) -> bool {
        self.owner_id == owner
    }

    /// Check that result path and error detail agree with the status.
    pub fn is_consistent(&self) -> bool {
        let has_path = self.result_path.as_deref().is_some_and(|p| !p.is_empty());
        let has_detail = self.error_detail.as_deref().is_some_and(|d| !d.is_empty());
        match self.status {
            JobStatus::Completed => has_path && !has_detail,
            JobStatus::Failed => has_detail && !has_path,
            JobStatus::Pending | JobStatus::Processing => !has_path && !has_detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(JobId(1), OwnerId(7), "clip.mp4");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_terminal());
        assert!(job.is_consistent());
        assert!(job.is_owned_by(OwnerId(7)));
        assert!(!job.is_owned_by(OwnerId(8)));
    }

    #[test]
    fn test_consistency_rules() {
        let mut job = Job::new(JobId(1), OwnerId(7), "clip.mp4");
        job.status = JobStatus::Completed;
        assert!(!job.is_consistent());

        job.result_path = Some("/out/7_clip_processed.zip".into());
        assert!(job.is_consistent());

        job.error_detail = Some("boom".into());
        assert!(!job.is_consistent());

        job.status = JobStatus::Failed;
        job.result_path = None;
        assert!(job.is_consistent());
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let job = Job::new(JobId(3), OwnerId(7), "a.mov");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["owner_id"], 7);
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("result_path").is_none());
    }
}
