//! Wire types for the Telephony Gateway: requests to the provider's Calls
//! API and the status/recording webhook payloads it posts back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inputs to `TelephonyClient::initiate_call`.
#[derive(Debug, Clone, Serialize)]
pub struct InitiateCallRequest {
    pub to: String,
    pub from: String,
    pub answer_url: String,
    pub status_callback_url: String,
    pub recording_callback_url: Option<String>,
    pub record: bool,
    pub timeout_sec: u32,
}

/// Result of a successful call initiation.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateCallResponse {
    #[serde(rename = "sid")]
    pub call_sid: String,
    pub status: CallStatus,
}

/// The provider's call-status vocabulary, normalized to a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "call_status", rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Busy,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    /// Statuses that `CallEvent.upsert` must never regress away from.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Failed
                | CallStatus::Busy
                | CallStatus::NoAnswer
                | CallStatus::Canceled
        )
    }

    fn from_provider_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "in-progress" | "in_progress" | "answered" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "busy" => Some(Self::Busy),
            "no-answer" | "no_answer" => Some(Self::NoAnswer),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Call direction as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "call_direction", rename_all = "kebab-case")]
pub enum CallDirection {
    Outbound,
    Inbound,
}

/// A validated status-callback webhook, parsed from a form-encoded POST.
#[derive(Debug, Clone)]
pub struct StatusWebhookPayload {
    pub call_sid: String,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
    pub duration_sec: Option<i64>,
    pub call_duration_sec: Option<i64>,
    pub recording_url: Option<String>,
    pub recording_sid: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Raw form fields as the provider actually sends them (`CallSid`,
/// `CallStatus`, ...). Parsed into `StatusWebhookPayload` by
/// `TelephonyClient::parse_status_webhook`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStatusWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "Direction")]
    pub direction: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "Duration")]
    pub duration: Option<String>,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: Option<String>,
}

/// The provider's recording-status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "recording_status", rename_all = "kebab-case")]
pub enum RecordingStatus {
    InProgress,
    Completed,
    Failed,
    Absent,
}

impl RecordingStatus {
    fn from_provider_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "in-progress" | "in_progress" | "processing" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// A validated recording-callback webhook.
#[derive(Debug, Clone)]
pub struct RecordingWebhookPayload {
    pub call_sid: String,
    pub recording_sid: String,
    pub status: RecordingStatus,
    pub duration_sec: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRecordingWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: String,
    #[serde(rename = "RecordingStatus")]
    pub recording_status: String,
    #[serde(rename = "RecordingDuration")]
    pub recording_duration: Option<String>,
    #[serde(rename = "RecordingChannels")]
    pub recording_channels: Option<String>,
    #[serde(rename = "RecordingSource")]
    pub recording_source: Option<String>,
}

use crate::error::TwilioError;

impl RawStatusWebhook {
    pub fn into_payload(self) -> Result<StatusWebhookPayload, TwilioError> {
        let status = CallStatus::from_provider_str(&self.call_status).ok_or_else(|| {
            TwilioError::InvalidWebhook(format!("unrecognized CallStatus: {}", self.call_status))
        })?;
        let direction = match self.direction.as_deref() {
            Some(d) if d.to_ascii_lowercase().starts_with("inbound") => CallDirection::Inbound,
            _ => CallDirection::Outbound,
        };
        Ok(StatusWebhookPayload {
            call_sid: self.call_sid,
            status,
            direction,
            from: self.from.unwrap_or_default(),
            to: self.to.unwrap_or_default(),
            duration_sec: self.duration.and_then(|d| d.parse().ok()),
            call_duration_sec: self.call_duration.and_then(|d| d.parse().ok()),
            recording_url: self.recording_url,
            recording_sid: self.recording_sid,
            timestamp: self
                .timestamp
                .and_then(|t| DateTime::parse_from_rfc2822(&t).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
        })
    }
}

impl RawRecordingWebhook {
    pub fn into_payload(self) -> Result<RecordingWebhookPayload, TwilioError> {
        let status = RecordingStatus::from_provider_str(&self.recording_status).ok_or_else(|| {
            TwilioError::InvalidWebhook(format!(
                "unrecognized RecordingStatus: {}",
                self.recording_status
            ))
        })?;
        Ok(RecordingWebhookPayload {
            call_sid: self.call_sid,
            recording_sid: self.recording_sid,
            status,
            duration_sec: self.recording_duration.and_then(|d| d.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(
            CallStatus::from_provider_str("in-progress"),
            Some(CallStatus::InProgress)
        );
        assert_eq!(
            CallStatus::from_provider_str("NO-ANSWER"),
            Some(CallStatus::NoAnswer)
        );
        assert_eq!(CallStatus::from_provider_str("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Busy.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::Queued.is_terminal());
    }

    #[test]
    fn raw_status_webhook_into_payload() {
        let raw = RawStatusWebhook {
            call_sid: "CA123".into(),
            call_status: "completed".into(),
            direction: Some("outbound-api".into()),
            from: Some("+15551230000".into()),
            to: Some("+15551234567".into()),
            duration: Some("42".into()),
            call_duration: Some("40".into()),
            timestamp: None,
            recording_url: None,
            recording_sid: None,
        };
        let payload = raw.into_payload().unwrap();
        assert_eq!(payload.call_sid, "CA123");
        assert_eq!(payload.status, CallStatus::Completed);
        assert_eq!(payload.direction, CallDirection::Outbound);
        assert_eq!(payload.duration_sec, Some(42));
    }

    #[test]
    fn raw_status_webhook_rejects_unknown_status() {
        let raw = RawStatusWebhook {
            call_sid: "CA123".into(),
            call_status: "not-a-real-status".into(),
            direction: None,
            from: None,
            to: None,
            duration: None,
            call_duration: None,
            timestamp: None,
            recording_url: None,
            recording_sid: None,
        };
        assert!(raw.into_payload().is_err());
    }
}
