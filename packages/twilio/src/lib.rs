//! Telephony Gateway client: initiates outbound calls against the voice
//! provider's REST API and validates the webhooks it posts back.
//!
//! Kept as its own crate (mirroring the reference server's layout) so it
//! can be depended on, faked, and unit-tested independently of the rest of
//! the call orchestration engine.

pub mod error;
pub mod models;
pub mod xml;

use reqwest::Client;
use std::collections::HashMap;

pub use error::TwilioError;
pub use models::{
    CallDirection, CallStatus, InitiateCallRequest, InitiateCallResponse, RawRecordingWebhook,
    RawStatusWebhook, RecordingStatus, RecordingWebhookPayload, StatusWebhookPayload,
};
pub use xml::{render_answer_xml, StreamOptions};

/// Credentials and account identifiers for the voice provider.
#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
}

/// Telephony Gateway client.
#[derive(Debug, Clone)]
pub struct TelephonyClient {
    options: TwilioOptions,
    http: Client,
}

impl TelephonyClient {
    pub fn new(options: TwilioOptions) -> Self {
        Self {
            options,
            http: Client::new(),
        }
    }

    /// `initiateCall({to, from, answerUrl, statusCallbackUrl,
    /// recordingCallbackUrl, record, timeoutSec}) -> {callSid, status}`.
    pub async fn initiate_call(
        &self,
        req: &InitiateCallRequest,
    ) -> Result<InitiateCallResponse, TwilioError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.options.account_sid
        );

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("To", req.to.clone());
        form.insert("From", req.from.clone());
        form.insert("Url", req.answer_url.clone());
        form.insert("StatusCallback", req.status_callback_url.clone());
        form.insert(
            "StatusCallbackEvent",
            "initiated ringing answered completed".to_string(),
        );
        form.insert("Timeout", req.timeout_sec.to_string());
        if req.record {
            form.insert("Record", "true".to_string());
            if let Some(cb) = &req.recording_callback_url {
                form.insert("RecordingStatusCallback", cb.clone());
                form.insert("RecordingStatusCallbackEvent", "completed".to_string());
            }
        }

        let response = self
            .http
            .post(url)
            .basic_auth(&self.options.account_sid, Some(&self.options.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "telephony provider rejected call initiation");
            return Err(TwilioError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<InitiateCallResponse>()
            .await
            .map_err(|e| TwilioError::InvalidResponse(e.to_string()))
    }

    /// `handleStatusWebhook(payload)` — validates and normalizes a
    /// status-callback form body into a `StatusWebhookPayload`.
    pub fn parse_status_webhook(raw: RawStatusWebhook) -> Result<StatusWebhookPayload, TwilioError> {
        raw.into_payload()
    }

    /// `handleRecordingWebhook(payload)` — validates and normalizes a
    /// recording-callback form body.
    pub fn parse_recording_webhook(
        raw: RawRecordingWebhook,
    ) -> Result<RecordingWebhookPayload, TwilioError> {
        raw.into_payload()
    }

    /// `renderAnswer(request)` — deterministic TwiML-like XML pointing the
    /// provider at the media bridge's WebSocket endpoint.
    pub fn render_answer(&self, media_stream_host: &str, options: &StreamOptions) -> String {
        render_answer_xml(media_stream_host, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_answer_delegates_to_xml_module() {
        let client = TelephonyClient::new(TwilioOptions {
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
        });
        let xml = client.render_answer(
            "engine.example.com",
            &StreamOptions {
                speak_first: false,
                initial_message: None,
            },
        );
        assert!(xml.contains("engine.example.com/media-stream"));
    }
}
