//! The `TranscriptEntry` entity: one turn of the AI/caller conversation for
//! a call, deduplicated by the provider's own message id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transcript_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    Caller,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub call_sid: String,

    /// The AI realtime peer's own message/item id, used as the dedup key so
    /// a reconnect-and-replay of the realtime stream never double-inserts a
    /// turn. `None` when the peer didn't supply one, in which case the
    /// entry is inserted unconditionally rather than deduplicated.
    pub provider_message_id: Option<String>,

    pub role: TranscriptRole,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to append a new transcript turn.
#[derive(Debug, Clone)]
pub struct NewTranscriptEntry {
    pub call_sid: String,
    pub provider_message_id: Option<String>,
    pub role: TranscriptRole,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}
