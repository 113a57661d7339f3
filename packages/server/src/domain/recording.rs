//! The `CallRecording` entity, upserted as the provider's recording
//! lifecycle (`in-progress` -> `completed`/`failed`) is reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twilio::RecordingStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecording {
    pub call_sid: String,
    pub recording_sid: String,
    pub status: RecordingStatus,
    pub duration_sec: Option<i64>,
    pub recording_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
