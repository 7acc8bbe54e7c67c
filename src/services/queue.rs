use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::db::queries::{self, QueueSql};
use crate::models::job::{JobRecord, JobType, QueueCounts};

const INSERT_BATCH_SIZE: usize = 10_000;

/// Durable storage of job records for one job type.
///
/// Every method is a single statement (or a single transaction for
/// `bulk_insert`), so each row mutation is atomic at the database.
#[async_trait]
pub trait QueueStore: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn counts(&self) -> Result<QueueCounts, StoreError>;
    async fn count_total(&self) -> Result<u64, StoreError>;
    async fn count_waiting(&self) -> Result<u64, StoreError>;
    async fn count_unfinished(&self) -> Result<u64, StoreError>;

    /// Workers that currently hold at least one claim.
    async fn in_flight_workers(&self) -> Result<Vec<String>, StoreError>;

    /// Clear `started`, `finished` and `dyno` on every row.
    async fn reset_all(&self) -> Result<u64, StoreError>;

    /// Return every claimed-but-unfinished row to waiting.
    async fn kick(&self) -> Result<u64, StoreError>;

    async fn truncate(&self) -> Result<(), StoreError>;

    /// Insert identifiers (lower-cased). Duplicates surface as `StoreError::Conflict`.
    async fn bulk_insert(&self, ids: &[String]) -> Result<u64, StoreError>;

    /// Atomically move one waiting row to claimed on behalf of `worker`.
    async fn claim_next(&self, worker: &str) -> Result<Option<String>, StoreError>;

    /// Mark a job finished. Returns false if it was already finished or unknown.
    async fn mark_finished(&self, id: &str) -> Result<bool, StoreError>;

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, StoreError>;
}

/// Postgres-backed queue for a single job type.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
    job_type: JobType,
    sql: &'static QueueSql,
}

impl PgQueueStore {
    pub fn new(pool: PgPool, job_type: JobType) -> Self {
        Self {
            pool,
            job_type,
            sql: queries::for_job_type(job_type),
        }
    }

    async fn count(&self, statement: &'static str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar(statement).fetch_one(&self.pool).await?;
        Ok(n as u64)
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let row = sqlx::query(self.sql.counts).fetch_one(&self.pool).await?;
        Ok(QueueCounts {
            total: row.try_get::<i64, _>("total")? as u64,
            waiting: row.try_get::<i64, _>("waiting")? as u64,
            claimed: row.try_get::<i64, _>("claimed")? as u64,
            done: row.try_get::<i64, _>("done")? as u64,
        })
    }

    async fn count_total(&self) -> Result<u64, StoreError> {
        self.count(self.sql.count_total).await
    }

    async fn count_waiting(&self) -> Result<u64, StoreError> {
        self.count(self.sql.count_waiting).await
    }

    async fn count_unfinished(&self) -> Result<u64, StoreError> {
        self.count(self.sql.count_unfinished).await
    }

    async fn in_flight_workers(&self) -> Result<Vec<String>, StoreError> {
        let workers: Vec<String> = sqlx::query_scalar(self.sql.in_flight_workers)
            .fetch_all(&self.pool)
            .await?;
        Ok(workers)
    }

    async fn reset_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(self.sql.reset_all).execute(&self.pool).await?;
        tracing::info!(job_type = %self.job_type, rows = result.rows_affected(), "Queue reset");
        Ok(result.rows_affected())
    }

    async fn kick(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(self.sql.kick).execute(&self.pool).await?;
        tracing::info!(job_type = %self.job_type, rows = result.rows_affected(), "Claimed jobs returned to waiting");
        Ok(result.rows_affected())
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        sqlx::query(self.sql.truncate).execute(&self.pool).await?;
        tracing::info!(job_type = %self.job_type, "Queue truncated");
        Ok(())
    }

    async fn bulk_insert(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in ids.chunks(INSERT_BATCH_SIZE) {
            let result = sqlx::query(self.sql.insert_ids)
                .bind(chunk)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<String>, StoreError> {
        let id: Option<String> = sqlx::query_scalar(self.sql.claim_next)
            .bind(worker)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn mark_finished(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(self.sql.mark_finished)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        let job = sqlx::query_as::<_, JobRecord>(self.sql.get_job)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Duplicate identifier rejected by {constraint}")]
    Conflict { constraint: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::Conflict {
                    constraint: db_err.constraint().unwrap_or("unique key").to_string(),
                };
            }
            if db_err.is_check_violation() {
                return StoreError::Constraint(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}
