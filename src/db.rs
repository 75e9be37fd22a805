//! Job catalog: the Postgres-backed table `F` (the Job Runner) claims rows
//! from and finalizes rows into.
//!
//! Grounded on `db.rs`'s `Db`/`Job` shape (pool wrapper, `#[derive(sqlx::FromRow)]`
//! row struct, one method per catalog operation) and on §4.6/§6's explicit
//! `SELECT ... FOR UPDATE SKIP LOCKED` contract, which is Postgres-specific --
//! unlike the teacher's SQLite pool, this catalog is opened against
//! `PgPool`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum JobStatus {
    Created = 0,
    Queued = 1,
    Process = 2,
    Done = 3,
    Error = 4,
}

impl JobStatus {
    fn as_i16(self) -> i16 {
        self as i16
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub status: i16,
    pub task_id: Option<Uuid>,
    pub source: String,
    pub basename: Option<Uuid>,
    pub preset: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        match self.status {
            0 => JobStatus::Created,
            1 => JobStatus::Queued,
            2 => JobStatus::Process,
            3 => JobStatus::Done,
            4 => JobStatus::Error,
            other => unreachable!("job status column constrained to 0..=4, got {other}"),
        }
    }
}

pub struct JobCatalog {
    pool: PgPool,
}

impl JobCatalog {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Claims `job_id` for `task_token`: locks the row `FOR UPDATE SKIP
    /// LOCKED`, verifies ownership and `status = QUEUED`, assigns a fresh
    /// `basename` if absent, transitions to `PROCESS`. Returns `None` if the
    /// row was locked by another worker, letting the caller retry.
    pub async fn claim(&self, job_id: i64, task_token: Uuid) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Job>(
            "SELECT id, status, task_id, source, basename, preset, metadata, duration, error, created, modified
             FROM jobs WHERE id = $1 FOR UPDATE SKIP LOCKED",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = row else {
            return Ok(None);
        };

        if job.task_id != Some(task_token) || job.status() != JobStatus::Queued {
            tx.rollback().await?;
            return Ok(None);
        }

        let basename = job.basename.unwrap_or_else(Uuid::new_v4);

        let claimed = sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = $1, basename = $2, modified = now()
             WHERE id = $3
             RETURNING id, status, task_id, source, basename, preset, metadata, duration, error, created, modified",
        )
        .bind(JobStatus::Process.as_i16())
        .bind(basename)
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(claimed))
    }

    /// Polls up to `limit` queued candidates, oldest first. Each returned
    /// job still needs a `claim` to actually take ownership -- this is a
    /// cheap, unlocked read used only to discover what to attempt next.
    pub async fn poll_queued(&self, limit: i64) -> Result<Vec<(i64, Uuid, String)>> {
        #[derive(sqlx::FromRow)]
        struct Candidate {
            id: i64,
            task_id: Option<Uuid>,
            source: String,
        }

        let rows: Vec<Candidate> = sqlx::query_as(
            "SELECT id, task_id, source FROM jobs WHERE status = $1 ORDER BY created ASC LIMIT $2",
        )
        .bind(JobStatus::Queued.as_i16())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|c| c.task_id.map(|t| (c.id, t, c.source)))
            .collect())
    }

    /// Finalizes `job_id`: verifies the row is still `PROCESS` and owned by
    /// `task_token`, then writes the terminal (or re-queued) fields. A
    /// mismatch means another worker already reclaimed the row -- this is
    /// `ConcurrencyLost`, a fatal, non-retried error (§4.6).
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize(
        &self,
        job_id: i64,
        task_token: Uuid,
        status: JobStatus,
        error: Option<String>,
        metadata: Option<serde_json::Value>,
        duration: Option<f64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Job>(
            "SELECT id, status, task_id, source, basename, preset, metadata, duration, error, created, modified
             FROM jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = row else {
            return Err(WorkerError::ConcurrencyLost);
        };
        if job.task_id != Some(task_token) || job.status() != JobStatus::Process {
            tx.rollback().await?;
            return Err(WorkerError::ConcurrencyLost);
        }

        sqlx::query(
            "UPDATE jobs SET status = $1, error = $2, metadata = $3, duration = $4, modified = now()
             WHERE id = $5",
        )
        .bind(status.as_i16())
        .bind(error)
        .bind(metadata)
        .bind(duration)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
