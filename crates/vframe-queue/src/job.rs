//! Queue payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vframe_models::{JobId, OwnerId};

/// Reference to a ledger job, carried from submission to the worker.
///
/// Older producers used `video_status_id`, `user_id`, `video_path` and
/// `processing_started`; those names are still accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    #[serde(alias = "video_status_id")]
    pub job_id: JobId,
    #[serde(alias = "user_id")]
    pub owner_id: OwnerId,
    /// Stored upload inside the artifact store
    #[serde(alias = "video_path")]
    pub source_path: PathBuf,
    pub original_filename: String,
    #[serde(alias = "processing_started")]
    pub submitted_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(
        job_id: JobId,
        owner_id: OwnerId,
        source_path: impl Into<PathBuf>,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            owner_id,
            source_path: source_path.into(),
            original_filename: original_filename.into(),
            submitted_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// A message handed to a consumer, pending until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Backend message id used for acknowledgement
    pub id: String,
    pub message: JobMessage,
}
