//! Persistent record of each job's lifecycle.
//!
//! This crate provides:
//! - The [`JobLedger`] trait injected into submission, worker and retrieval
//! - A Postgres implementation backed by sqlx
//! - An in-memory implementation for tests and local runs
//!
//! Every implementation enforces the forward-only status machine from
//! [`vframe_models::JobStatus`] atomically per write.

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryJobLedger;
pub use postgres::PgJobLedger;

use async_trait::async_trait;
use vframe_models::{Job, JobId, OwnerId};

/// Job status store.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Insert a new job in `Pending` status.
    async fn create_pending(&self, owner_id: OwnerId, original_filename: &str) -> LedgerResult<Job>;

    async fn find(&self, id: JobId) -> LedgerResult<Option<Job>>;

    /// All jobs of one owner, newest first.
    async fn list_by_owner(&self, owner_id: OwnerId) -> LedgerResult<Vec<Job>>;

    /// Move to `Processing`. Re-marking a processing job only bumps `updated_at`.
    async fn mark_processing(&self, id: JobId) -> LedgerResult<Job>;

    async fn mark_completed(&self, id: JobId, result_path: &str) -> LedgerResult<Job>;

    async fn mark_failed(&self, id: JobId, error_detail: &str) -> LedgerResult<Job>;

    /// Reachability check for health reporting.
    async fn ping(&self) -> LedgerResult<()>;
}
