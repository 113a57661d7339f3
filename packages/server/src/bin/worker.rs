//! `worker`: starts a Worker Pool against `DATABASE_URL`, claiming and
//! executing jobs for every registered family.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use twilio::{TelephonyClient, TwilioOptions};

use server_core::config::Config;
use server_core::jobs::families::{
    PlaceCallHandler, RefillFromLeadsHandler, PLACE_CALL_JOB_TYPE, REFILL_FROM_LEADS_JOB_TYPE,
};
use server_core::jobs::store::PostgresJobStore;
use server_core::jobs::worker::{JobHandlerRegistry, Worker, WorkerConfig};
use server_core::jobs::RateLimiter;
use server_core::persistence::{LinkagePersistenceLayer, PersistenceLayer};
use server_core::telephony::TelephonyGateway;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(config.worker_concurrency as u32 + 2)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PostgresJobStore::new(pool.clone()));

    let telephony_client = TelephonyClient::new(TwilioOptions {
        account_sid: config.twilio_account_sid.clone(),
        auth_token: config.twilio_auth_token.clone(),
    });
    let gateway = Arc::new(TelephonyGateway::new(telephony_client, &config));
    let persistence: Arc<dyn PersistenceLayer> =
        Arc::new(LinkagePersistenceLayer::new(pool.clone()));

    let mut registry = JobHandlerRegistry::new();
    registry.register(
        PLACE_CALL_JOB_TYPE,
        Arc::new(PlaceCallHandler::new(gateway, persistence.clone())),
    );
    registry.register(
        REFILL_FROM_LEADS_JOB_TYPE,
        Arc::new(RefillFromLeadsHandler::new(store.clone(), persistence)),
    );

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_count,
        config.rate_limit_window,
    ));

    let worker_config = WorkerConfig {
        batch_size: config.worker_concurrency as i64,
        poll_interval: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(20),
        shutdown_drain_timeout: Duration::from_secs(30),
        ..WorkerConfig::default()
    };

    let worker = Arc::new(Worker::new(
        store,
        Arc::new(registry),
        rate_limiter,
        worker_config,
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, draining in-flight jobs");
        shutdown_signal.cancel();
    });

    worker.run(shutdown).await;
    Ok(())
}
