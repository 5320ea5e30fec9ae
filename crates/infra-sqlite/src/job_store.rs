// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use nfse_core::domain::{DomainError, Job, JobId, JobKind, JobParams, JobStatus};
use nfse_core::error::{AppError, Result};
use nfse_core::port::{
    EnqueueOutcome, JobFilter, JobPage, JobStore, PageRequest, StaleSweep, TimeProvider,
    ABANDONED_MESSAGE,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn find_in_flight(&self, unit_key: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE unit_key = ? AND status IN ('PENDING', 'RUNNING') LIMIT 1",
        )
        .bind(unit_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn current_status(&self, id: &JobId) -> Result<Option<JobStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(status.map(|s| s.parse()).transpose()?)
    }

    /// Explain why a conditional status update touched no row
    async fn transition_error(&self, id: &JobId, to: JobStatus) -> AppError {
        match self.current_status(id).await {
            Ok(None) => AppError::NotFound(format!("Job {} not found", id)),
            Ok(Some(from)) => AppError::Domain(DomainError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
            Err(e) => e,
        }
    }

    async fn insert_if_unit_free(&self, job: &Job) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs (
                id, tenant_id, kind, status, priority, params, unit_key,
                result, error_message, retry_count, max_retries,
                scheduled_at, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.tenant_id)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(job.params.to_value().to_string())
        .bind(&job.unit_key)
        .bind(job.result.as_ref().map(|v| v.to_string()))
        .bind(&job.error_message)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome> {
        // The partial unique index on unit_key makes the insert and the dedup one atomic step.
        // A second pass covers the in-flight job finishing between the insert and the lookup.
        for _ in 0..2 {
            if self.insert_if_unit_free(job).await? {
                return Ok(EnqueueOutcome::Enqueued(job.clone()));
            }
            if let Some(existing) = self.find_in_flight(&job.unit_key).await? {
                return Ok(EnqueueOutcome::AlreadyQueued(existing));
            }
        }
        Err(AppError::Conflict(format!(
            "Job {} could not be enqueued (duplicate id?)",
            job.id
        )))
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.time_provider.now_millis();

        // One statement under SQLite's writer lock: no job is handed out twice
        let mut rows = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'RUNNING', started_at = ?, completed_at = NULL
            WHERE status = 'PENDING'
              AND seq IN (
                SELECT seq FROM jobs
                WHERE status = 'PENDING' AND scheduled_at <= ?
                ORDER BY priority ASC, scheduled_at ASC, seq ASC
                LIMIT ?
              )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // RETURNING order is unspecified
        rows.sort_by_key(|r| (r.priority, r.scheduled_at, r.seq));

        let jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>>>()?;
        if !jobs.is_empty() {
            debug!(claimed = jobs.len(), "Claimed pending jobs");
        }
        Ok(jobs)
    }

    async fn complete(&self, id: &JobId, result: serde_json::Value) -> Result<()> {
        let now = self.time_provider.now_millis();
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'COMPLETED', result = ?, error_message = NULL,
                completed_at = MAX(?, COALESCE(started_at, ?))
            WHERE id = ? AND status = 'RUNNING'
            "#,
        )
        .bind(result.to_string())
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }
        match self.current_status(id).await? {
            Some(JobStatus::Completed) => Ok(()),
            _ => Err(self.transition_error(id, JobStatus::Completed).await),
        }
    }

    async fn fail(&self, id: &JobId, error_message: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', error_message = ?,
                completed_at = MAX(?, COALESCE(started_at, ?))
            WHERE id = ? AND status = 'RUNNING'
            "#,
        )
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 1 {
            Ok(())
        } else {
            Err(self.transition_error(id, JobStatus::Failed).await)
        }
    }

    async fn retry(&self, id: &JobId, retry_at: i64) -> Result<Job> {
        // A unique-index violation here means another job for the unit is in flight
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'PENDING', retry_count = retry_count + 1, scheduled_at = ?,
                started_at = NULL, completed_at = NULL
            WHERE id = ? AND status = 'FAILED' AND retry_count < max_retries
            RETURNING *
            "#,
        )
        .bind(retry_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Job {}: unit already has a job in flight", id))
            }
            other => other,
        })?;

        if let Some(row) = row {
            return row.into_job();
        }

        match self.find_by_id(id).await? {
            None => Err(AppError::NotFound(format!("Job {} not found", id))),
            Some(job) if job.status == JobStatus::Failed => {
                Err(AppError::Domain(DomainError::RetryExhausted {
                    job_id: job.id,
                    retry_count: job.retry_count,
                    max_retries: job.max_retries,
                }))
            }
            Some(job) => Err(AppError::Domain(DomainError::InvalidStateTransition {
                from: job.status.to_string(),
                to: JobStatus::Pending.to_string(),
            })),
        }
    }

    async fn cancel(&self, id: &JobId) -> Result<Job> {
        let now = self.time_provider.now_millis();
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'CANCELLED', completed_at = MAX(?, COALESCE(started_at, ?))
            WHERE id = ? AND status IN ('PENDING', 'RUNNING')
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_job(),
            None => Err(self.transition_error(id, JobStatus::Cancelled).await),
        }
    }

    async fn cleanup_older_than(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED')
              AND COALESCE(completed_at, created_at) < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn requeue_stale(&self, started_before: i64) -> Result<StaleSweep> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let abandoned = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', error_message = ?,
                completed_at = MAX(?, COALESCE(started_at, ?))
            WHERE status = 'RUNNING'
              AND (started_at IS NULL OR started_at < ?)
              AND retry_count >= max_retries
            "#,
        )
        .bind(ABANDONED_MESSAGE)
        .bind(now)
        .bind(now)
        .bind(started_before)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PENDING', retry_count = retry_count + 1,
                started_at = NULL, scheduled_at = ?
            WHERE status = 'RUNNING'
              AND (started_at IS NULL OR started_at < ?)
              AND retry_count < max_retries
            "#,
        )
        .bind(now)
        .bind(started_before)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;

        if requeued + abandoned > 0 {
            warn!(
                requeued = requeued,
                abandoned = abandoned,
                "Swept stale running jobs"
            );
        }
        Ok(StaleSweep {
            requeued,
            abandoned,
        })
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<JobPage> {
        let tenant = filter.tenant_id.as_deref();
        let status = filter.status.map(|s| s.as_str());
        let kind = filter.kind.map(|k| k.as_str());

        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR tenant_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR kind = ?3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM jobs {}", WHERE))
            .bind(tenant)
            .bind(status)
            .bind(kind)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC, seq DESC LIMIT ?4 OFFSET ?5",
            WHERE
        ))
        .bind(tenant)
        .bind(status)
        .bind(kind)
        .bind(page.per_page as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(JobPage {
            jobs: rows
                .into_iter()
                .map(JobRow::into_job)
                .collect::<Result<Vec<_>>>()?,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    seq: i64,
    id: String,
    tenant_id: String,
    kind: String,
    status: String,
    priority: i32,
    params: String,
    unit_key: String,
    result: Option<String>,
    error_message: Option<String>,
    retry_count: i32,
    max_retries: i32,
    scheduled_at: i64,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl JobRow {
    /// Rows are re-validated on read; a corrupt row is an error, not a default
    fn into_job(self) -> Result<Job> {
        let kind: JobKind = self.kind.parse()?;
        let payload: serde_json::Value = serde_json::from_str(&self.params)?;
        let params = JobParams::parse(kind, &payload)?;
        let result: Option<serde_json::Value> = match self.result.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };

        Ok(Job {
            id: self.id,
            tenant_id: self.tenant_id,
            kind,
            status: self.status.parse()?,
            priority: self.priority,
            params,
            unit_key: self.unit_key,
            result,
            error_message: self.error_message,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            scheduled_at: self.scheduled_at,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}
