//! `place_call`: the job family that asks the Telephony Gateway to dial a
//! lead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use twilio::StreamOptions;
use uuid::Uuid;

use crate::jobs::model::{ErrorKind, Job};
use crate::jobs::worker::JobHandler;
use crate::persistence::PersistenceLayer;
use crate::telephony::TelephonyGateway;

pub const JOB_TYPE: &str = "place_call";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceCallPayload {
    pub to: String,
    /// The lead this call is for, if it originated from a known lead
    /// rather than an ad-hoc `scheduleImmediate` call.
    pub lead_id: Option<Uuid>,
    /// Free-form context for the AI peer; not interpreted by this handler.
    pub message: Option<String>,
    #[serde(default)]
    pub record: bool,
    /// Whether the AI should speak before the caller does, and what it
    /// should open with, carried through the answer URL's query string
    /// to `/voice/answer`.
    #[serde(default)]
    pub speak_first: bool,
    pub initial_message: Option<String>,
    /// Opaque pass-through bag for context this handler never interprets,
    /// e.g. `refill_from_leads` stamping `{automationRun, scheduledAt}`.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub struct PlaceCallHandler {
    gateway: Arc<TelephonyGateway>,
    persistence: Arc<dyn PersistenceLayer>,
}

impl PlaceCallHandler {
    pub fn new(gateway: Arc<TelephonyGateway>, persistence: Arc<dyn PersistenceLayer>) -> Self {
        Self { gateway, persistence }
    }
}

#[async_trait]
impl JobHandler for PlaceCallHandler {
    async fn handle(&self, job: &Job) -> Result<(), (String, ErrorKind)> {
        let payload: PlaceCallPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| (format!("invalid payload: {e}"), ErrorKind::NonRetryable))?;

        if payload.to.trim().is_empty() {
            return Err(("`to` must not be empty".to_string(), ErrorKind::NonRetryable));
        }

        let stream_options = StreamOptions {
            speak_first: payload.speak_first,
            initial_message: payload.initial_message.clone(),
        };

        let response = self
            .gateway
            .place_call(&payload.to, payload.record, &stream_options)
            .await
            .map_err(|e| {
                let kind = if e.is_retryable() {
                    ErrorKind::Retryable
                } else {
                    ErrorKind::NonRetryable
                };
                (e.to_string(), kind)
            })?;

        info!(
            lead_id = ?payload.lead_id,
            call_sid = %response.call_sid,
            "call placed"
        );

        // Best-effort: a failure to stamp the lead `contacted` never fails
        // the job back, since the call itself already succeeded.
        if let Some(lead_id) = payload.lead_id {
            if let Err(e) = self
                .persistence
                .mark_lead_called(lead_id, &response.call_sid)
                .await
            {
                warn!(lead_id = %lead_id, error = %e, "failed to mark lead as called");
            }
        }

        Ok(())
    }
}
