//! PostgreSQL-backed Job Store: atomic claiming via `FOR UPDATE SKIP
//! LOCKED`, idempotent enqueue, exponential-backoff retry, and the
//! retention sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::JobStoreError;

use super::model::{ErrorKind, Job, JobPriority, JobStatus, NewJob};

/// Outcome of an idempotent enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Created(Uuid),
    Duplicate(Uuid),
}

impl EnqueueResult {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// Aggregate counts by status, returned by `JobStore::stats`.
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    pub pending: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// The Job Store interface. Implemented against PostgreSQL; faked in
/// worker tests.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue(&self, new_job: NewJob) -> Result<EnqueueResult, JobStoreError>;

    /// Atomically enqueue a batch: either all jobs are inserted or none are
    /// (a single failure fails the whole batch).
    async fn bulk_enqueue(&self, jobs: Vec<NewJob>) -> Result<Vec<EnqueueResult>, JobStoreError>;

    /// Claim up to `limit` jobs that are `pending` and due, or `running`
    /// with an expired lease, for exclusive processing by `worker_id`.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>, JobStoreError>;

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<(), JobStoreError>;
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        kind: ErrorKind,
    ) -> Result<(), JobStoreError>;

    /// Cancel a job that has not yet been claimed.
    async fn cancel(&self, job_id: Uuid) -> Result<bool, JobStoreError>;

    /// Fetch a single job by id (Scheduler Control Plane `getJob`).
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError>;

    /// List jobs in a given status, newest first (`listByState`).
    async fn list_by_state(&self, status: JobStatus, limit: i64) -> Result<Vec<Job>, JobStoreError>;

    /// Reset a `failed` job back to `pending` for immediate reclaim
    /// (`retry`).
    async fn retry(&self, job_id: Uuid) -> Result<bool, JobStoreError>;

    /// Extend the lease of a running job (heartbeat renewal).
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<(), JobStoreError>;

    async fn stats(&self) -> Result<JobStats, JobStoreError>;

    /// Delete terminal jobs past the retention policy. Returns the number
    /// of rows removed.
    async fn clean(
        &self,
        completed_older_than: DateTime<Utc>,
        keep_last_n_completed: i64,
        failed_older_than: DateTime<Utc>,
    ) -> Result<u64, JobStoreError>;

    /// Backs `pause()`/`resume()`: persisted so every worker process (and
    /// every `SchedulerControlPlane` instance talking to the same store)
    /// observes the same pause state, not just the one that issued the
    /// call.
    async fn set_paused(&self, paused: bool) -> Result<(), JobStoreError>;

    async fn is_paused(&self) -> Result<bool, JobStoreError>;
}

pub struct PostgresJobStore {
    pool: sqlx::PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, JobStoreError> {
        let job = sqlx::query_as::<_, Job>(
            r#"SELECT * FROM jobs WHERE idempotency_key = $1 LIMIT 1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    fn build_job(new_job: &NewJob) -> Job {
        let mut builder = Job::builder()
            .job_type(new_job.job_type.clone())
            .payload(new_job.payload.clone())
            .priority(new_job.priority)
            .max_attempts(new_job.max_attempts)
            .backoff_base_ms(new_job.backoff_base_ms)
            .lease_duration_ms(new_job.lease_duration_ms);
        if let Some(key) = &new_job.idempotency_key {
            builder = builder.idempotency_key(key.clone());
        }
        if let Some(run_at) = new_job.scheduled_for {
            builder = builder.scheduled_for(run_at);
        }
        builder.build()
    }

    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, job_type, payload, priority, scheduled_for, idempotency_key,
                max_attempts, attempts, backoff_base_ms, lease_duration_ms,
                lease_expires_at, worker_id, status, last_error, last_error_kind,
                recurring_schedule_id, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.priority)
        .bind(job.scheduled_for)
        .bind(&job.idempotency_key)
        .bind(job.max_attempts)
        .bind(job.attempts)
        .bind(job.backoff_base_ms)
        .bind(job.lease_duration_ms)
        .bind(job.lease_expires_at)
        .bind(&job.worker_id)
        .bind(job.status)
        .bind(&job.last_error)
        .bind(job.last_error_kind)
        .bind(job.recurring_schedule_id)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue(&self, new_job: NewJob) -> Result<EnqueueResult, JobStoreError> {
        if let Some(key) = &new_job.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let job = Self::build_job(&new_job);
        self.insert(&job).await?;
        Ok(EnqueueResult::Created(job.id))
    }

    async fn bulk_enqueue(&self, jobs: Vec<NewJob>) -> Result<Vec<EnqueueResult>, JobStoreError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(jobs.len());

        for new_job in &jobs {
            if let Some(key) = &new_job.idempotency_key {
                let existing = sqlx::query_as::<_, Job>(
                    r#"SELECT * FROM jobs WHERE idempotency_key = $1 LIMIT 1"#,
                )
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
                if let Some(existing) = existing {
                    results.push(EnqueueResult::Duplicate(existing.id));
                    continue;
                }
            }

            let job = Self::build_job(new_job);
            sqlx::query(
                r#"
                INSERT INTO jobs (
                    id, job_type, payload, priority, scheduled_for, idempotency_key,
                    max_attempts, attempts, backoff_base_ms, lease_duration_ms,
                    lease_expires_at, worker_id, status, last_error, last_error_kind,
                    recurring_schedule_id, created_at, updated_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
                )
                "#,
            )
            .bind(job.id)
            .bind(&job.job_type)
            .bind(&job.payload)
            .bind(job.priority)
            .bind(job.scheduled_for)
            .bind(&job.idempotency_key)
            .bind(job.max_attempts)
            .bind(job.attempts)
            .bind(job.backoff_base_ms)
            .bind(job.lease_duration_ms)
            .bind(job.lease_expires_at)
            .bind(&job.worker_id)
            .bind(job.status)
            .bind(&job.last_error)
            .bind(job.last_error_kind)
            .bind(job.recurring_schedule_id)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&mut *tx)
            .await?;

            results.push(EnqueueResult::Created(job.id));
        }

        tx.commit().await?;
        Ok(results)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>, JobStoreError> {
        // A lease-expired `running` job can still be reclaimed under pause
        // (it was already dispatched before the pause took effect), but no
        // `pending` job is newly claimed while paused.
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE
                    (
                        status = 'pending'
                        AND (scheduled_for IS NULL OR scheduled_for <= NOW())
                        AND NOT (SELECT paused FROM scheduler_state WHERE id = 1)
                    )
                    OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY priority, COALESCE(scheduled_for, created_at)
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                lease_expires_at = NOW() + (lease_duration_ms || ' milliseconds')::INTERVAL,
                worker_id = $2,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"UPDATE jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1"#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id));
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        kind: ErrorKind,
    ) -> Result<(), JobStoreError> {
        let job = sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(JobStoreError::NotFound(job_id))?;

        if kind.should_retry() && job.attempts < job.max_attempts {
            let delay = chrono::Duration::milliseconds(job.backoff_delay_ms());
            let retry_at = Utc::now() + delay;

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    attempts = attempts + 1,
                    scheduled_for = $1,
                    lease_expires_at = NULL,
                    worker_id = NULL,
                    last_error = $2,
                    last_error_kind = $3,
                    updated_at = NOW()
                WHERE id = $4
                "#,
            )
            .bind(retry_at)
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    last_error = $1,
                    last_error_kind = $2,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', last_error_kind = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError> {
        let job = sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn list_by_state(&self, status: JobStatus, limit: i64) -> Result<Vec<Job>, JobStoreError> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"SELECT * FROM jobs WHERE status = $1 ORDER BY created_at DESC LIMIT $2"#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn retry(&self, job_id: Uuid) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                scheduled_for = NULL,
                lease_expires_at = NULL,
                worker_id = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + (lease_duration_ms || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running' AND worker_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let rows: Vec<(JobStatus, i64)> =
            sqlx::query_as(r#"SELECT status, COUNT(*) FROM jobs GROUP BY status"#)
                .fetch_all(&self.pool)
                .await?;

        let mut stats = JobStats::default();
        for (status, count) in rows {
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Succeeded => stats.succeeded = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }

    async fn clean(
        &self,
        completed_older_than: DateTime<Utc>,
        keep_last_n_completed: i64,
        failed_older_than: DateTime<Utc>,
    ) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            r#"
            WITH keep AS (
                SELECT id FROM jobs
                WHERE status = 'succeeded'
                ORDER BY updated_at DESC
                LIMIT $2
            )
            DELETE FROM jobs
            WHERE (
                status = 'succeeded' AND updated_at < $1 AND id NOT IN (SELECT id FROM keep)
            ) OR (
                status IN ('failed', 'cancelled') AND updated_at < $3
            )
            "#,
        )
        .bind(completed_older_than)
        .bind(keep_last_n_completed)
        .bind(failed_older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_paused(&self, paused: bool) -> Result<(), JobStoreError> {
        sqlx::query(r#"UPDATE scheduler_state SET paused = $1 WHERE id = 1"#)
            .bind(paused)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_paused(&self) -> Result<bool, JobStoreError> {
        let paused: bool =
            sqlx::query_scalar(r#"SELECT paused FROM scheduler_state WHERE id = 1"#)
                .fetch_one(&self.pool)
                .await?;
        Ok(paused)
    }
}

/// Convenience constructor for a job that does not need priority/backoff
/// overrides (`place_call` jobs mostly use this shape).
pub fn immediate(job_type: &str, payload: serde_json::Value) -> NewJob {
    NewJob {
        job_type: job_type.to_string(),
        payload,
        ..Default::default()
    }
}

pub fn delayed(job_type: &str, payload: serde_json::Value, run_at: DateTime<Utc>) -> NewJob {
    NewJob {
        job_type: job_type.to_string(),
        payload,
        scheduled_for: Some(run_at),
        ..Default::default()
    }
}

pub fn with_priority(mut new_job: NewJob, priority: JobPriority) -> NewJob {
    new_job.priority = priority;
    new_job
}
