//! `refill_from_leads`: a cron-driven job family that tops the queue back
//! up with `place_call` jobs for leads that have never been called.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::JobStoreError;
use crate::jobs::model::{ErrorKind, Job, JobPriority, NewJob};
use crate::jobs::store::JobStore;
use crate::jobs::worker::JobHandler;
use crate::persistence::PersistenceLayer;

use super::place_call::{PlaceCallPayload, JOB_TYPE as PLACE_CALL_JOB_TYPE};

pub const JOB_TYPE: &str = "refill_from_leads";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefillFromLeadsPayload {
    /// Free-form context carried through to every `place_call` job this
    /// run schedules; not interpreted here.
    pub message: Option<String>,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default = "default_lead_limit")]
    pub lead_limit: i64,
}

fn default_lead_limit() -> i64 {
    50
}

impl Default for RefillFromLeadsPayload {
    fn default() -> Self {
        Self {
            message: None,
            priority: JobPriority::default(),
            lead_limit: default_lead_limit(),
        }
    }
}

/// Shared by `RefillFromLeadsHandler` (the durable, queue-dispatched path)
/// and `SchedulerControlPlane::run_refill_now` (the synchronous one-shot
/// operation): query leads with a phone that have never been called, and
/// bulk-enqueue one `place_call` job per lead. Returns the number actually
/// created (duplicates via idempotency key don't count).
pub async fn run_refill<S: JobStore>(
    store: &S,
    persistence: &(dyn PersistenceLayer),
    message: Option<String>,
    priority: JobPriority,
    lead_limit: i64,
) -> Result<usize, JobStoreError> {
    let leads = persistence
        .leads_without_calls(lead_limit)
        .await
        .map_err(|e| JobStoreError::InvalidOptions(e.to_string()))?;

    if leads.is_empty() {
        info!("refill-from-leads found no leads without calls");
        return Ok(0);
    }

    let scheduled_at = Utc::now();
    let new_jobs = leads
        .into_iter()
        .filter_map(|lead| {
            let to = lead.phone_number.clone()?;
            let payload = PlaceCallPayload {
                to,
                lead_id: Some(lead.id),
                message: message.clone(),
                record: false,
                speak_first: false,
                initial_message: None,
                metadata: serde_json::json!({
                    "automationRun": true,
                    "scheduledAt": scheduled_at,
                }),
            };
            Some(NewJob {
                job_type: PLACE_CALL_JOB_TYPE.to_string(),
                payload: serde_json::to_value(payload).expect("PlaceCallPayload always serializes"),
                priority,
                scheduled_for: None,
                idempotency_key: Some(format!("place_call:{}", lead.id)),
                max_attempts: 3,
                backoff_base_ms: 2_000,
                lease_duration_ms: 60_000,
            })
        })
        .collect::<Vec<_>>();

    let created = store
        .bulk_enqueue(new_jobs)
        .await?
        .iter()
        .filter(|r| r.is_created())
        .count();

    info!(enqueued = created, "refill-from-leads enqueued place_call jobs");
    Ok(created)
}

pub struct RefillFromLeadsHandler<S: JobStore> {
    store: Arc<S>,
    persistence: Arc<dyn PersistenceLayer>,
}

impl<S: JobStore> RefillFromLeadsHandler<S> {
    pub fn new(store: Arc<S>, persistence: Arc<dyn PersistenceLayer>) -> Self {
        Self { store, persistence }
    }
}

#[async_trait]
impl<S: JobStore> JobHandler for RefillFromLeadsHandler<S> {
    async fn handle(&self, job: &Job) -> Result<(), (String, ErrorKind)> {
        let payload: RefillFromLeadsPayload =
            serde_json::from_value(job.payload.clone()).unwrap_or_default();

        run_refill(
            self.store.as_ref(),
            self.persistence.as_ref(),
            payload.message,
            payload.priority,
            payload.lead_limit,
        )
        .await
        .map(|_| ())
        .map_err(|e| (e.to_string(), ErrorKind::Retryable))
    }
}
