//! The `CallEvent` entity: the current known status of one outbound call,
//! keyed by provider `call_sid`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twilio::{CallDirection, CallStatus};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub job_id: Option<Uuid>,

    pub call_sid: String,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,

    pub duration_sec: Option<i64>,
    pub call_duration_sec: Option<i64>,
    pub recording_url: Option<String>,
    pub recording_sid: Option<String>,

    pub last_event_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Precedence used by `LinkageLayer::upsert_call_event` to decide whether an
/// incoming status webhook should overwrite the stored row: a terminal
/// status is never regressed back to a non-terminal one, and a replayed
/// webhook for the same status is a no-op.
pub fn should_apply_status(current: Option<CallStatus>, incoming: CallStatus) -> bool {
    match current {
        None => true,
        Some(current) if current == incoming => false,
        // Once a row has reached a terminal status, nothing further ever
        // applies: not a regression to non-terminal, and not a swap to a
        // different terminal status either.
        Some(current) => !current.is_terminal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_always_applies() {
        assert!(should_apply_status(None, CallStatus::Ringing));
    }

    #[test]
    fn terminal_status_is_not_regressed() {
        assert!(!should_apply_status(
            Some(CallStatus::Completed),
            CallStatus::InProgress
        ));
    }

    #[test]
    fn replaying_the_same_terminal_status_is_a_no_op() {
        assert!(!should_apply_status(
            Some(CallStatus::Completed),
            CallStatus::Completed
        ));
    }

    #[test]
    fn non_terminal_progression_applies() {
        assert!(should_apply_status(
            Some(CallStatus::Ringing),
            CallStatus::InProgress
        ));
    }
}
