//! Job listing and archive retrieval.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::File;

use vframe_ledger::{JobLedger, LedgerError};
use vframe_models::{Job, JobId, JobStatus, OwnerId};
use vframe_storage::{ArtifactStore, StorageError};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {0} belongs to another owner")]
    Forbidden(JobId),

    #[error("Job {job_id} is {status}, not completed")]
    NotCompleted { job_id: JobId, status: JobStatus },

    #[error("Archive for job {0} is missing")]
    ArtifactMissing(JobId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(StorageError),
}

/// An open archive ready to stream.
#[derive(Debug)]
pub struct ArchiveDownload {
    pub file: File,
    pub len: u64,
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct RetrievalService {
    ledger: Arc<dyn JobLedger>,
    store: ArtifactStore,
}

impl RetrievalService {
    pub fn new(ledger: Arc<dyn JobLedger>, store: ArtifactStore) -> Self {
        Self { ledger, store }
    }

    /// Jobs of `owner_id`, newest first.
    pub async fn list(&self, owner_id: OwnerId) -> Result<Vec<Job>, RetrievalError> {
        Ok(self.ledger.list_by_owner(owner_id).await?)
    }

    /// Look up a job, checking ownership before anything about its state is
    /// revealed.
    pub async fn owned_job(&self, job_id: JobId, owner_id: OwnerId) -> Result<Job, RetrievalError> {
        let job = self
            .ledger
            .find(job_id)
            .await?
            .ok_or(RetrievalError::NotFound(job_id))?;
        if !job.is_owned_by(owner_id) {
            return Err(RetrievalError::Forbidden(job_id));
        }
        Ok(job)
    }

    /// Open the archive of a completed job.
    pub async fn open_archive(&self, job_id: JobId, owner_id: OwnerId) -> Result<ArchiveDownload, RetrievalError> {
        let job = self.owned_job(job_id, owner_id).await?;
        if job.status != JobStatus::Completed {
            return Err(RetrievalError::NotCompleted {
                job_id,
                status: job.status,
            });
        }

        let path = PathBuf::from(job.result_path.ok_or(RetrievalError::ArtifactMissing(job_id))?);
        let (file, len) = match self.store.open(&path).await {
            Ok(opened) => opened,
            Err(StorageError::NotFound(_)) => return Err(RetrievalError::ArtifactMissing(job_id)),
            Err(e) => return Err(RetrievalError::Storage(e)),
        };

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("job_{}.zip", job_id));

        Ok(ArchiveDownload {
            file,
            len,
            file_name,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vframe_ledger::InMemoryJobLedger;
    use vframe_storage::StorageConfig;

    async fn setup(dir: &TempDir) -> (Arc<InMemoryJobLedger>, RetrievalService) {
        let ledger = Arc::new(InMemoryJobLedger::new());
        let service = RetrievalService::new(ledger.clone(), ArtifactStore::new(StorageConfig::under(dir.path())));
        (ledger, service)
    }

    #[tokio::test]
    async fn test_open_completed_archive() {
        let dir = TempDir::new().unwrap();
        let (ledger, service) = setup(&dir).await;

        let archive = dir.path().join("7_clip_processed.zip");
        std::fs::write(&archive, b"PK-not-really").unwrap();

        let job = ledger.create_pending(OwnerId(7), "clip.mp4").await.unwrap();
        ledger.mark_processing(job.id).await.unwrap();
        ledger
            .mark_completed(job.id, &archive.to_string_lossy())
            .await
            .unwrap();

        let download = service.open_archive(job.id, OwnerId(7)).await.unwrap();
        assert_eq!(download.file_name, "7_clip_processed.zip");
        assert_eq!(download.len, 13);
    }

    #[tokio::test]
    async fn test_ownership_checked_before_status() {
        let dir = TempDir::new().unwrap();
        let (ledger, service) = setup(&dir).await;

        let job = ledger.create_pending(OwnerId(7), "clip.mp4").await.unwrap();

        let err = service.open_archive(job.id, OwnerId(8)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Forbidden(_)));

        let err = service.open_archive(job.id, OwnerId(7)).await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::NotCompleted {
                status: JobStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dir = TempDir::new().unwrap();
        let (_ledger, service) = setup(&dir).await;

        let err = service.open_archive(JobId(404), OwnerId(7)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::NotFound(JobId(404))));
    }

    #[tokio::test]
    async fn test_deleted_archive_is_missing() {
        let dir = TempDir::new().unwrap();
        let (ledger, service) = setup(&dir).await;

        let job = ledger.create_pending(OwnerId(7), "clip.mp4").await.unwrap();
        ledger.mark_processing(job.id).await.unwrap();
        ledger
            .mark_completed(job.id, &dir.path().join("gone.zip").to_string_lossy())
            .await
            .unwrap();

        let err = service.open_archive(job.id, OwnerId(7)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::ArtifactMissing(_)));
    }

    #[tokio::test]
    async fn test_list_only_own_jobs() {
        let dir = TempDir::new().unwrap();
        let (ledger, service) = setup(&dir).await;

        ledger.create_pending(OwnerId(7), "a.mp4").await.unwrap();
        ledger.create_pending(OwnerId(8), "b.mp4").await.unwrap();
        ledger.create_pending(OwnerId(7), "c.mp4").await.unwrap();

        let jobs = service.list(OwnerId(7)).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.owner_id == OwnerId(7)));
    }
}
