//! Parses and validates the provider's status/recording webhooks.
//!
//! Signature verification (the provider's request-signature header) is
//! intentionally out of scope here; it's left to the deployment's
//! edge/ingress layer.

use twilio::{RawRecordingWebhook, RawStatusWebhook, RecordingWebhookPayload, StatusWebhookPayload, TwilioError};

pub fn parse_status_webhook(raw: RawStatusWebhook) -> Result<StatusWebhookPayload, TwilioError> {
    raw.into_payload()
}

pub fn parse_recording_webhook(
    raw: RawRecordingWebhook,
) -> Result<RecordingWebhookPayload, TwilioError> {
    raw.into_payload()
}
