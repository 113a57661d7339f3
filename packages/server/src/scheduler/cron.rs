//! Cron wiring for the recurring job families: refill-from-leads and the
//! job-store retention sweep.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::jobs::families::refill_from_leads::RefillFromLeadsPayload;
use crate::jobs::model::{JobPriority, NewJob};
use crate::jobs::store::JobStore;

/// Starts the scheduler: every hour, enqueue a `refill_from_leads` job;
/// daily, sweep terminal jobs past the retention policy. Both ticks consult
/// the Job Store's own persisted pause flag on every fire rather than an
/// in-process flag, so a `cli pause` issued from another process takes
/// effect here too.
pub async fn start_scheduler<S: JobStore + 'static>(
    store: Arc<S>,
    config: Arc<Config>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let refill_store = store.clone();
    let refill_job = CronJob::new_async("0 0 * * * *", move |_uuid, _lock| {
        let store = refill_store.clone();
        Box::pin(async move {
            match store.is_paused().await {
                Ok(true) => {
                    info!("scheduler paused, skipping refill-from-leads tick");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "failed to read scheduler pause state, skipping refill-from-leads tick");
                    return;
                }
            }
            if let Err(e) = enqueue_refill(&store).await {
                error!(error = %e, "refill-from-leads cron tick failed");
            }
        })
    })?;
    scheduler.add(refill_job).await?;

    let sweep_store = store.clone();
    let sweep_config = config.clone();
    let sweep_job = CronJob::new_async("0 0 3 * * *", move |_uuid, _lock| {
        let store = sweep_store.clone();
        let config = sweep_config.clone();
        Box::pin(async move {
            match store.is_paused().await {
                Ok(true) => {
                    info!("scheduler paused, skipping retention sweep tick");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "failed to read scheduler pause state, skipping retention sweep tick");
                    return;
                }
            }
            if let Err(e) = run_retention_sweep(&store, &config).await {
                error!(error = %e, "retention sweep cron tick failed");
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    scheduler.start().await?;
    info!("scheduler control plane started (hourly refill, daily retention sweep)");
    Ok(scheduler)
}

async fn enqueue_refill<S: JobStore>(store: &Arc<S>) -> Result<()> {
    let new_job = NewJob {
        job_type: crate::jobs::families::REFILL_FROM_LEADS_JOB_TYPE.to_string(),
        payload: serde_json::to_value(RefillFromLeadsPayload {
            message: None,
            priority: JobPriority::Low,
            lead_limit: 50,
        })
        .expect("RefillFromLeadsPayload always serializes"),
        priority: JobPriority::Low,
        scheduled_for: None,
        idempotency_key: None,
        max_attempts: 3,
        backoff_base_ms: 2_000,
        lease_duration_ms: 60_000,
    };
    store.enqueue(new_job).await?;
    Ok(())
}

async fn run_retention_sweep<S: JobStore>(store: &Arc<S>, config: &Config) -> Result<()> {
    let now = chrono::Utc::now();
    let removed = store
        .clean(
            now - chrono::Duration::from_std(config.completed_retention_age)?,
            config.completed_retention_count,
            now - chrono::Duration::from_std(config.failed_retention_age)?,
        )
        .await?;
    info!(removed, "retention sweep complete");
    Ok(())
}
