//! The Worker Pool: a long-running poll loop that claims jobs from the
//! Job Store, dispatches them to a registered handler, and reports the
//! outcome back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{ErrorKind, Job};
use super::rate_limit::RateLimiter;
use super::store::JobStore;

/// A job-family handler: deserializes `job.payload` and executes the
/// associated side effect (placing a call, refilling from leads, ...).
/// Registered per `job_type` in a `JobHandlerRegistry`, one handler per
/// job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), (String, ErrorKind)>;
}

#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.to_string(), handler);
    }

    fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub shutdown_drain_timeout: Duration,
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(20),
            shutdown_drain_timeout: Duration::from_secs(30),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

/// The pool: one instance polls the store in a loop and fans claimed jobs
/// out to concurrent tasks, rate-limited by `RateLimiter`.
pub struct Worker<S: JobStore> {
    store: Arc<S>,
    registry: Arc<JobHandlerRegistry>,
    rate_limiter: Arc<RateLimiter>,
    config: WorkerConfig,
    running: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl<S: JobStore + 'static> Worker<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<JobHandlerRegistry>,
        rate_limiter: Arc<RateLimiter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            rate_limiter,
            config,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn process_job(&self, job: Job, shutdown: &CancellationToken) {
        let job_id = job.id;
        let job_type = job.job_type.clone();
        let job_cancel = shutdown.child_token();
        self.running.write().await.insert(job_id, job_cancel.clone());

        let Some(handler) = self.registry.get(&job_type) else {
            error!(job_id = %job_id, job_type = %job_type, "no handler registered for job type");
            if let Err(e) = self
                .store
                .mark_failed(job_id, "no handler registered", ErrorKind::NonRetryable)
                .await
            {
                error!(job_id = %job_id, error = %e, "failed to mark job as failed");
            }
            self.running.write().await.remove(&job_id);
            return;
        };

        let result = self
            .execute_with_heartbeat(job_id, handler, job.clone(), job_cancel.clone())
            .await;

        match result {
            Ok(()) => {
                debug!(job_id = %job_id, job_type = %job_type, "job succeeded");
                if let Err(e) = self.store.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                }
            }
            Err((message, kind)) => {
                let kind = if shutdown.is_cancelled() {
                    ErrorKind::Retryable
                } else {
                    kind
                };
                warn!(job_id = %job_id, job_type = %job_type, error = %message, "job failed");
                if let Err(e) = self.store.mark_failed(job_id, &message, kind).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                }
            }
        }

        self.running.write().await.remove(&job_id);
    }

    async fn execute_with_heartbeat(
        &self,
        job_id: Uuid,
        handler: Arc<dyn JobHandler>,
        job: Job,
        cancel: CancellationToken,
    ) -> Result<(), (String, ErrorKind)> {
        let store = self.store.clone();
        let worker_id = self.config.worker_id.clone();
        let interval = self.config.heartbeat_interval;
        let heartbeat_cancel = cancel.clone();

        let heartbeat_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.heartbeat(job_id, &worker_id).await {
                            warn!(job_id = %job_id, error = %e, "heartbeat failed");
                        }
                    }
                }
            }
        });

        let result = handler.handle(&job).await;
        cancel.cancel();
        let _ = heartbeat_handle.await;
        result
    }

    /// Run the poll loop until `shutdown` fires, then drain in-flight jobs.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(worker_id = %self.config.worker_id, batch_size = self.config.batch_size, "worker pool starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let jobs = match self.store.claim(&self.config.worker_id, self.config.batch_size).await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            // The token bucket gates dispatch, not claiming: a claimed job
            // already holds its lease and simply waits its turn (delayed,
            // never dropped) rather than being released.
            let mut handles = Vec::with_capacity(jobs.len());
            for job in jobs {
                loop {
                    if shutdown.is_cancelled() || self.rate_limiter.try_acquire() {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                    }
                }

                let this = self.clone();
                let shutdown_child = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    this.process_job(job, &shutdown_child).await;
                }));
            }
            futures::future::join_all(handles).await;
        }

        let running_count = self.running.read().await.len();
        if running_count > 0 {
            info!(count = running_count, "waiting for running jobs to complete");
            {
                let running = self.running.read().await;
                for token in running.values() {
                    token.cancel();
                }
            }
            let start = std::time::Instant::now();
            let timeout = self.config.shutdown_drain_timeout;
            while !self.running.read().await.is_empty() && start.elapsed() < timeout {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        info!(worker_id = %self.config.worker_id, "worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_have_a_worker_id() {
        let config = WorkerConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.batch_size, 10);
    }
}
