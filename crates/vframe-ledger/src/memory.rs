//! In-memory ledger.
//!
//! Holds jobs in a map behind a mutex. Used by tests and single-process
//! development runs; nothing survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use vframe_models::{Job, JobId, JobStatus, OwnerId};

use crate::{JobLedger, LedgerError, LedgerResult};

#[derive(Default)]
pub struct InMemoryJobLedger {
    jobs: Mutex<HashMap<JobId, Job>>,
    next_id: AtomicI64,
}

impl InMemoryJobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn transition(
        &self,
        id: JobId,
        next: JobStatus,
        result_path: Option<&str>,
        error_detail: Option<&str>,
    ) -> LedgerResult<Job> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(LedgerError::NotFound(id))?;

        job.status = job.status.transition_to(next)?;
        job.result_path = result_path.map(str::to_string);
        job.error_detail = error_detail.map(str::to_string);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

#[async_trait]
impl JobLedger for InMemoryJobLedger {
    async fn create_pending(&self, owner_id: OwnerId, original_filename: &str) -> LedgerResult<Job> {
        if original_filename.trim().is_empty() {
            return Err(LedgerError::invalid_input("original filename must not be empty"));
        }
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let job = Job::new(id, owner_id, original_filename);
        self.jobs.lock().await.insert(id, job.clone());
        Ok(job)
    }

    async fn find(&self, id: JobId) -> LedgerResult<Option<Job>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> LedgerResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn mark_processing(&self, id: JobId) -> LedgerResult<Job> {
        self.transition(id, JobStatus::Processing, None, None).await
    }

    async fn mark_completed(&self, id: JobId, result_path: &str) -> LedgerResult<Job> {
        if result_path.is_empty() {
            return Err(LedgerError::invalid_input("result path must not be empty"));
        }
        self.transition(id, JobStatus::Completed, Some(result_path), None)
            .await
    }

    async fn mark_failed(&self, id: JobId, error_detail: &str) -> LedgerResult<Job> {
        if error_detail.is_empty() {
            return Err(LedgerError::invalid_input("error detail must not be empty"));
        }
        self.transition(id, JobStatus::Failed, None, Some(error_detail))
            .await
    }

    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}
