//! `SchedulerControlPlane`: the public operations surface over the Job
//! Store, plus a `CronRegistry` tracking the in-process repeat patterns it
//! has registered.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::JobStoreError;
use crate::jobs::families::refill_from_leads::{run_refill, RefillFromLeadsPayload, JOB_TYPE as REFILL_FROM_LEADS_JOB_TYPE};
use crate::jobs::families::{PlaceCallPayload, PLACE_CALL_JOB_TYPE};
use crate::jobs::model::{Job, JobPriority, JobStatus, NewJob};
use crate::jobs::store::{EnqueueResult, JobStats, JobStore};
use crate::persistence::PersistenceLayer;

use super::control_plane::ControlPlane;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
    #[error("cron registration failed: {0}")]
    Cron(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("no registered schedule with id {0}")]
    ScheduleNotFound(Uuid),
}

/// Common fields shared by `scheduleImmediate`/`scheduleDelayed`/
/// `scheduleRecurring`/`scheduleBulk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleCallInput {
    pub to: String,
    pub message: Option<String>,
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub speak_first: bool,
    pub initial_message: Option<String>,
}

impl ScheduleCallInput {
    fn into_new_job(self, scheduled_for: Option<DateTime<Utc>>, idempotency_key: Option<String>) -> NewJob {
        let payload = PlaceCallPayload {
            to: self.to,
            lead_id: self.lead_id,
            message: self.message,
            record: self.record,
            speak_first: self.speak_first,
            initial_message: self.initial_message,
            metadata: serde_json::Value::Null,
        };
        NewJob {
            job_type: PLACE_CALL_JOB_TYPE.to_string(),
            payload: serde_json::to_value(payload).expect("PlaceCallPayload always serializes"),
            priority: self.priority,
            scheduled_for,
            idempotency_key,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            lease_duration_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleDelayedOptions {
    pub delay_ms: Option<i64>,
    pub schedule_at: Option<DateTime<Utc>>,
}

impl ScheduleDelayedOptions {
    /// `delay = max(0, target - now)`.
    fn resolve(&self) -> DateTime<Utc> {
        if let Some(at) = self.schedule_at {
            let now = Utc::now();
            if at > now {
                at
            } else {
                now
            }
        } else {
            let delay = self.delay_ms.unwrap_or(0).max(0);
            Utc::now() + chrono::Duration::milliseconds(delay)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleRefillInput {
    pub cron_expression: String,
    pub message: Option<String>,
    pub priority: JobPriority,
    pub lead_limit: i64,
}

#[derive(Debug, Clone)]
pub struct RunRefillNowInput {
    pub message: Option<String>,
    pub priority: JobPriority,
    pub lead_limit: i64,
}

/// A registered repeat pattern, tracked so `listSchedules`/`stopSchedule`
/// can report on and remove it (`tokio_cron_scheduler` itself only tracks
/// handles, not the intent behind them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub id: Uuid,
    pub cron_expression: String,
    pub kind: ScheduleKind,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    RecurringCall,
    Refill,
}

pub struct SchedulerControlPlane<S: JobStore> {
    store: Arc<S>,
    persistence: Arc<dyn PersistenceLayer>,
    control_plane: ControlPlane,
    scheduler: JobScheduler,
    schedules: Arc<RwLock<HashMap<Uuid, ScheduleInfo>>>,
}

impl<S: JobStore + 'static> SchedulerControlPlane<S> {
    pub async fn new(
        store: Arc<S>,
        persistence: Arc<dyn PersistenceLayer>,
        control_plane: ControlPlane,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            store,
            persistence,
            control_plane,
            scheduler: JobScheduler::new().await?,
            schedules: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn schedule_immediate(&self, input: ScheduleCallInput) -> Result<Uuid, SchedulerError> {
        let key = input.lead_id.map(|id| format!("place_call:{id}"));
        let new_job = input.into_new_job(None, key);
        Ok(self.store.enqueue(new_job).await?.job_id())
    }

    pub async fn schedule_delayed(
        &self,
        input: ScheduleCallInput,
        options: ScheduleDelayedOptions,
    ) -> Result<Uuid, SchedulerError> {
        let run_at = options.resolve();
        let key = input.lead_id.map(|id| format!("place_call:{id}"));
        let new_job = input.into_new_job(Some(run_at), key);
        Ok(self.store.enqueue(new_job).await?.job_id())
    }

    pub async fn schedule_bulk(
        &self,
        inputs: Vec<ScheduleCallInput>,
    ) -> Result<Vec<EnqueueResult>, SchedulerError> {
        let new_jobs = inputs
            .into_iter()
            .map(|input| {
                let key = input.lead_id.map(|id| format!("place_call:{id}"));
                input.into_new_job(None, key)
            })
            .collect();
        Ok(self.store.bulk_enqueue(new_jobs).await?)
    }

    /// Registers a repeat pattern that places the same call on every cron
    /// tick.
    pub async fn schedule_recurring(
        &self,
        input: ScheduleCallInput,
        cron_expression: String,
    ) -> Result<Uuid, SchedulerError> {
        let store = self.store.clone();
        let new_job_template = input;
        let cron_for_job = cron_expression.clone();

        let job = CronJob::new_async(cron_expression.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            let new_job = new_job_template.clone().into_new_job(None, None);
            Box::pin(async move {
                if let Err(e) = store.enqueue(new_job).await {
                    error!(error = %e, "recurring place-call tick failed to enqueue");
                }
            })
        })?;

        let schedule_id = self.scheduler.add(job).await?;
        self.schedules.write().await.insert(
            schedule_id,
            ScheduleInfo {
                id: schedule_id,
                cron_expression: cron_for_job,
                kind: ScheduleKind::RecurringCall,
                registered_at: Utc::now(),
            },
        );
        Ok(schedule_id)
    }

    /// Registers a repeat pattern that refills the queue from the lead
    /// store. Each tick enqueues a durable `refill_from_leads` job rather
    /// than running the refill inline, so a lead-store outage retries
    /// under the Job Store's standard backoff instead of silently failing
    /// the tick.
    pub async fn schedule_refill(&self, input: ScheduleRefillInput) -> Result<Uuid, SchedulerError> {
        let store = self.store.clone();
        let message = input.message.clone();
        let priority = input.priority;
        let lead_limit = input.lead_limit;
        let cron_for_job = input.cron_expression.clone();

        let job = CronJob::new_async(input.cron_expression.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            let message = message.clone();
            Box::pin(async move {
                match store.is_paused().await {
                    Ok(true) => {
                        info!("scheduler paused, skipping refill repeat tick");
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(error = %e, "failed to read scheduler pause state, skipping refill repeat tick");
                        return;
                    }
                }
                let new_job = NewJob {
                    job_type: REFILL_FROM_LEADS_JOB_TYPE.to_string(),
                    payload: serde_json::to_value(RefillFromLeadsPayload {
                        message,
                        priority,
                        lead_limit,
                    })
                    .expect("RefillFromLeadsPayload always serializes"),
                    priority,
                    scheduled_for: None,
                    idempotency_key: None,
                    max_attempts: 3,
                    backoff_base_ms: 2_000,
                    lease_duration_ms: 60_000,
                };
                if let Err(e) = store.enqueue(new_job).await {
                    error!(error = %e, "refill repeat tick failed to enqueue refill_from_leads job");
                }
            })
        })?;

        let schedule_id = self.scheduler.add(job).await?;
        self.schedules.write().await.insert(
            schedule_id,
            ScheduleInfo {
                id: schedule_id,
                cron_expression: cron_for_job,
                kind: ScheduleKind::Refill,
                registered_at: Utc::now(),
            },
        );
        Ok(schedule_id)
    }

    pub async fn list_schedules(&self) -> Vec<ScheduleInfo> {
        self.schedules.read().await.values().cloned().collect()
    }

    pub async fn stop_schedule(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        if self.schedules.write().await.remove(&job_id).is_none() {
            return Err(SchedulerError::ScheduleNotFound(job_id));
        }
        self.scheduler.remove(&job_id).await?;
        Ok(())
    }

    /// One-shot refill, returning how many `place_call` jobs were actually
    /// created (duplicates via idempotency key don't count).
    pub async fn run_refill_now(&self, input: RunRefillNowInput) -> Result<usize, SchedulerError> {
        Ok(run_refill(
            self.store.as_ref(),
            self.persistence.as_ref(),
            input.message,
            input.priority,
            input.lead_limit,
        )
        .await?)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, SchedulerError> {
        Ok(self.store.get(job_id).await?)
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, SchedulerError> {
        Ok(self.store.cancel(job_id).await?)
    }

    pub async fn retry(&self, job_id: Uuid) -> Result<bool, SchedulerError> {
        Ok(self.store.retry(job_id).await?)
    }

    pub async fn stats(&self) -> Result<JobStats, SchedulerError> {
        Ok(self.store.stats().await?)
    }

    pub async fn list_by_state(&self, status: JobStatus, limit: i64) -> Result<Vec<Job>, SchedulerError> {
        Ok(self.store.list_by_state(status, limit).await?)
    }

    pub async fn clean(&self, config: &Config) -> Result<u64, SchedulerError> {
        let now = Utc::now();
        Ok(self
            .store
            .clean(
                now - chrono::Duration::from_std(config.completed_retention_age)
                    .unwrap_or_default(),
                config.completed_retention_count,
                now - chrono::Duration::from_std(config.failed_retention_age).unwrap_or_default(),
            )
            .await?)
    }

    /// Persisted in the Job Store so pausing takes effect for every
    /// worker process, not just whichever process issued the call.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.control_plane.pause();
        self.store.set_paused(true).await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.control_plane.resume();
        self.store.set_paused(false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_options_resolve_to_now_plus_delay() {
        let opts = ScheduleDelayedOptions {
            delay_ms: Some(5_000),
            schedule_at: None,
        };
        let now = Utc::now();
        let resolved = opts.resolve();
        assert!(resolved > now);
        assert!(resolved <= now + chrono::Duration::milliseconds(5_100));
    }

    #[test]
    fn delayed_options_clamp_past_schedule_at_to_now() {
        let opts = ScheduleDelayedOptions {
            delay_ms: None,
            schedule_at: Some(Utc::now() - chrono::Duration::seconds(60)),
        };
        let now = Utc::now();
        assert!(opts.resolve() >= now);
    }
}
