//! Postgres-backed ledger for the `jobs` table.
//!
//! Status writes are a single conditional `UPDATE` whose `WHERE` clause lists
//! the statuses the target may be reached from, so concurrent writers cannot
//! move a job backwards or out of a terminal state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use vframe_models::{InvalidTransition, Job, JobId, JobStatus, OwnerId};

use crate::{JobLedger, LedgerConfig, LedgerError, LedgerResult};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, original_filename, status, result_path, error_detail, \
    created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    owner_id: i64,
    original_filename: String,
    status: String,
    result_path: Option<String>,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = LedgerError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| LedgerError::corrupt_row(format!("job {}: {}", row.id, e)))?;
        Ok(Job {
            id: JobId(row.id),
            owner_id: OwnerId(row.owner_id),
            original_filename: row.original_filename,
            status,
            result_path: row.result_path,
            error_detail: row.error_detail,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Ledger stored in Postgres.
#[derive(Clone)]
pub struct PgJobLedger {
    pool: PgPool,
}

impl PgJobLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and optionally apply migrations.
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        info!("Connecting to ledger database at {}", config.redacted_url());
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        let ledger = Self::new(pool);
        if config.run_migrations {
            ledger.migrate().await?;
        }
        Ok(ledger)
    }

    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Ledger migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Conditionally move a job to `next`, writing the terminal fields.
    async fn transition(
        &self,
        id: JobId,
        next: JobStatus,
        result_path: Option<&str>,
        error_detail: Option<&str>,
    ) -> LedgerResult<Job> {
        let allowed: Vec<String> = JobStatus::sources_of(next)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let query = format!(
            "UPDATE jobs \
             SET status = $2, result_path = $3, error_detail = $4, updated_at = NOW() \
             WHERE id = $1 AND status = ANY($5) \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, JobRow>(&query)
            .bind(id.as_i64())
            .bind(next.as_str())
            .bind(result_path)
            .bind(error_detail)
            .bind(&allowed)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                // Nothing matched: either the row is gone or its status forbids the move.
                let current = self.find(id).await?.ok_or(LedgerError::NotFound(id))?;
                Err(InvalidTransition {
                    from: current.status,
                    to: next,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl JobLedger for PgJobLedger {
    async fn create_pending(&self, owner_id: OwnerId, original_filename: &str) -> LedgerResult<Job> {
        if original_filename.trim().is_empty() {
            return Err(LedgerError::invalid_input("original filename must not be empty"));
        }
        let query = format!(
            "INSERT INTO jobs (owner_id, original_filename, status) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(owner_id.as_i64())
            .bind(original_filename)
            .bind(JobStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn find(&self, id: JobId) -> LedgerResult<Option<Job>> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> LedgerResult<Vec<Job>> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(owner_id.as_i64())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
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
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
