//! `server`: the axum HTTP/WS binary exposing the call orchestration
//! engine's external interfaces: the TwiML answer endpoint, the
//! status/recording webhooks, the media-stream WebSocket upgrade, and a
//! health check, and starting the Scheduler Control Plane's cron-driven
//! recurring jobs.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use twilio::{RawRecordingWebhook, RawStatusWebhook, RecordingStatus, StreamOptions, TelephonyClient, TwilioOptions};

use server_core::bridge::BridgeManager;
use server_core::config::Config;
use server_core::jobs::store::PostgresJobStore;
use server_core::persistence::{LinkagePersistenceLayer, PersistenceLayer};
use server_core::scheduler::start_scheduler;
use server_core::telephony::{webhooks, TelephonyGateway};

struct AppState {
    gateway: Arc<TelephonyGateway>,
    persistence: Arc<dyn PersistenceLayer>,
    bridge: BridgeManager,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let telephony_client = TelephonyClient::new(TwilioOptions {
        account_sid: config.twilio_account_sid.clone(),
        auth_token: config.twilio_auth_token.clone(),
    });
    let gateway = Arc::new(TelephonyGateway::new(telephony_client, &config));

    let persistence: Arc<dyn PersistenceLayer> =
        Arc::new(LinkagePersistenceLayer::new(pool.clone()));

    let bridge = BridgeManager::new(config.clone(), persistence.clone());

    let job_store = Arc::new(PostgresJobStore::new(pool.clone()));
    let _cron_scheduler = start_scheduler(job_store, config.clone())
        .await
        .context("failed to start scheduler")?;

    let state = Arc::new(AppState {
        gateway,
        persistence,
        bridge,
    });

    let app = Router::new()
        .route("/voice/answer", get(answer).post(answer))
        .route("/webhooks/status", post(webhook_status))
        .route("/webhooks/recording", post(webhook_recording))
        .route("/media-stream", get(media_stream))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "call orchestration engine listening");

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    Ok(())
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

/// Query parameters the `Stream` URL carries, originally set by
/// `TelephonyGateway::place_call`.
#[derive(Debug, Deserialize)]
struct StreamOptionsQuery {
    #[serde(default, rename = "speakFirst")]
    speak_first: bool,
    #[serde(default, rename = "initialMessage")]
    initial_message: Option<String>,
}

impl From<StreamOptionsQuery> for StreamOptions {
    fn from(q: StreamOptionsQuery) -> Self {
        StreamOptions {
            speak_first: q.speak_first,
            initial_message: q.initial_message,
        }
    }
}

async fn answer(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamOptionsQuery>,
) -> impl IntoResponse {
    let xml = state.gateway.render_answer(&query.into());
    ([(axum::http::header::CONTENT_TYPE, "text/xml")], xml)
}

// Every webhook handler answers 200 regardless of internal outcome, to stop
// the provider from retrying a delivery that a later, idempotent webhook
// will correct anyway. Failures are only logged here.
async fn webhook_status(
    State(state): State<Arc<AppState>>,
    Form(raw): Form<RawStatusWebhook>,
) -> impl IntoResponse {
    let payload = match webhooks::parse_status_webhook(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "rejected malformed status webhook");
            return StatusCode::OK;
        }
    };

    if let Err(e) = state.persistence.upsert_call_event(None, None, payload).await {
        warn!(error = %e, "failed to upsert call event from status webhook");
    }
    StatusCode::OK
}

async fn webhook_recording(
    State(state): State<Arc<AppState>>,
    Form(raw): Form<RawRecordingWebhook>,
) -> impl IntoResponse {
    let payload = match webhooks::parse_recording_webhook(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "rejected malformed recording webhook");
            return StatusCode::OK;
        }
    };

    // Only a `completed` recording triggers downstream processing;
    // intermediate statuses are acknowledged and dropped.
    if payload.status != RecordingStatus::Completed {
        return StatusCode::OK;
    }

    if let Err(e) = state.persistence.upsert_recording(payload).await {
        warn!(error = %e, "failed to upsert recording from recording webhook");
    }
    StatusCode::OK
}

async fn media_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamOptionsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let bridge = state.bridge.clone();
    let stream_options: StreamOptions = query.into();
    ws.on_upgrade(move |socket| async move {
        bridge.handle_provider_socket(socket, stream_options).await;
    })
}
