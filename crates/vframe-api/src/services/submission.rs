//! Video submission.
//!
//! Three steps in a fixed order: store the upload, insert the Pending ledger
//! row, publish the job message. Each step undoes what came before it when it
//! fails, so a failed submission leaves neither an orphaned file nor a job that
//! stays Pending forever.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use vframe_ledger::{JobLedger, LedgerError};
use vframe_models::{JobId, OwnerId};
use vframe_queue::{JobMessage, JobPublisher, QueueError};
use vframe_storage::{ArtifactStore, StorageError};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to store upload: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to record job: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to enqueue job: {0}")]
    Enqueue(#[from] QueueError),
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub job_id: JobId,
    pub original_filename: String,
    /// Stored upload size
    pub bytes: u64,
}

#[derive(Clone)]
pub struct SubmissionService {
    ledger: Arc<dyn JobLedger>,
    publisher: Arc<dyn JobPublisher>,
    store: ArtifactStore,
}

impl SubmissionService {
    pub fn new(ledger: Arc<dyn JobLedger>, publisher: Arc<dyn JobPublisher>, store: ArtifactStore) -> Self {
        Self {
            ledger,
            publisher,
            store,
        }
    }

    /// Persist `reader` and queue a frame extraction job for it.
    pub async fn submit<R>(
        &self,
        owner_id: OwnerId,
        original_filename: &str,
        reader: &mut R,
    ) -> Result<SubmissionReceipt, SubmissionError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if original_filename.trim().is_empty() {
            return Err(SubmissionError::InvalidInput("filename must not be empty".to_string()));
        }

        let stored = self.store.save_upload(owner_id, original_filename, reader).await?;

        let job = match self.ledger.create_pending(owner_id, original_filename).await {
            Ok(job) => job,
            Err(e) => {
                self.discard_upload(&stored.path).await;
                return Err(e.into());
            }
        };

        let message = JobMessage::new(job.id, owner_id, stored.path.clone(), original_filename);
        match self.publisher.publish(&message).await {
            Ok(message_id) => {
                info!(
                    job_id = %job.id,
                    owner_id = %owner_id,
                    bytes = stored.bytes,
                    "Submitted {} as message {}",
                    original_filename,
                    message_id
                );
            }
            Err(e) => {
                let detail = format!("failed to enqueue job: {e}");
                if let Err(mark) = self.ledger.mark_failed(job.id, &detail).await {
                    error!(job_id = %job.id, "Failed to mark unqueued job failed: {}", mark);
                }
                self.discard_upload(&stored.path).await;
                return Err(e.into());
            }
        }

        Ok(SubmissionReceipt {
            job_id: job.id,
            original_filename: job.original_filename,
            bytes: stored.bytes,
        })
    }

    async fn discard_upload(&self, path: &std::path::Path) {
        if let Err(e) = self.store.remove_file(path).await {
            warn!("Failed to remove upload {}: {}", path.display(), e);
        }
    }
}
