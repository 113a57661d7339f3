//! Job model for the durable queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Lower value runs first within a priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
pub enum JobPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    pub fn as_i16(&self) -> i16 {
        match self {
            JobPriority::Critical => 0,
            JobPriority::High => 1,
            JobPriority::Normal => 2,
            JobPriority::Low => 3,
        }
    }
}

/// Classifies a job failure for the retry-vs-failed decision (spec
/// §4.1 step 3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    Retryable,
    NonRetryable,
    Cancelled,
}

impl ErrorKind {
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// The job family, e.g. `"place_call"` or `"refill_from_leads"` (spec
    /// §9: one job family maps to exactly one `job_type`).
    pub job_type: String,
    pub payload: serde_json::Value,

    #[builder(default)]
    pub priority: JobPriority,

    /// Earliest instant the job becomes claimable; `None` means "now".
    #[builder(default, setter(strip_option))]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Deduplicates concurrent enqueue attempts for the same logical
    /// operation. Enforced by a unique index.
    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,

    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default = 0)]
    pub attempts: i32,
    /// Initial backoff in milliseconds; doubled per attempt
    /// (`base * 2^(attempts-1)`).
    #[builder(default = 2_000)]
    pub backoff_base_ms: i64,

    #[builder(default = 60_000)]
    pub lease_duration_ms: i64,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    #[builder(default)]
    pub status: JobStatus,

    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,
    #[builder(default, setter(strip_option))]
    pub last_error_kind: Option<ErrorKind>,

    /// The cron schedule that produced this job, if it is (or descends
    /// from) a recurring job.
    #[builder(default, setter(strip_option))]
    pub recurring_schedule_id: Option<Uuid>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Backoff delay before the next attempt, given the attempt count
    /// *before* this failure was recorded.
    pub fn backoff_delay_ms(&self) -> i64 {
        let exponent = self.attempts.max(1) - 1;
        self.backoff_base_ms.saturating_mul(1i64 << exponent.min(20))
    }
}

/// Input to `JobStore::enqueue` / `JobStore::bulk_enqueue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub lease_duration_ms: i64,
}

impl Default for NewJob {
    fn default() -> Self {
        Self {
            job_type: String::new(),
            payload: serde_json::Value::Null,
            priority: JobPriority::default(),
            scheduled_for: None,
            idempotency_key: None,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            lease_duration_ms: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_critical_first() {
        let mut tiers = vec![JobPriority::Low, JobPriority::Critical, JobPriority::Normal];
        tiers.sort();
        assert_eq!(
            tiers,
            vec![JobPriority::Critical, JobPriority::Normal, JobPriority::Low]
        );
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let mut job = Job::builder()
            .job_type("place_call")
            .payload(serde_json::json!({}))
            .backoff_base_ms(1_000)
            .build();
        job.attempts = 1;
        assert_eq!(job.backoff_delay_ms(), 1_000);
        job.attempts = 2;
        assert_eq!(job.backoff_delay_ms(), 2_000);
        job.attempts = 3;
        assert_eq!(job.backoff_delay_ms(), 4_000);
    }

    #[test]
    fn error_kind_retry_classification() {
        assert!(ErrorKind::Retryable.should_retry());
        assert!(!ErrorKind::NonRetryable.should_retry());
        assert!(!ErrorKind::Cancelled.should_retry());
    }
}
