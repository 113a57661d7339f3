//! `PersistenceLayer` implementation backed by PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use twilio::{RecordingWebhookPayload, StatusWebhookPayload};
use uuid::Uuid;

use crate::domain::call_event::should_apply_status;
use crate::domain::lead::LeadStatus;
use crate::domain::{CallEvent, CallRecording, Lead, NewLead, TranscriptEntry};
use crate::domain::transcript::{NewTranscriptEntry, TranscriptRole};
use crate::error::PersistenceError;

/// Every write to `CallEvent`/`TranscriptEntry`/`CallRecording`/
/// `Lead.call_sid` goes through this trait so the idempotency and linkage
/// invariants hold no matter the caller.
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    async fn upsert_call_event(
        &self,
        lead_id: Option<Uuid>,
        job_id: Option<Uuid>,
        payload: StatusWebhookPayload,
    ) -> Result<CallEvent, PersistenceError>;

    async fn append_transcript_entry(
        &self,
        entry: NewTranscriptEntry,
    ) -> Result<TranscriptEntry, PersistenceError>;

    async fn upsert_recording(
        &self,
        payload: RecordingWebhookPayload,
    ) -> Result<CallRecording, PersistenceError>;

    async fn find_lead_by_phone(&self, phone_number: &str) -> Result<Option<Lead>, PersistenceError>;
    async fn create_lead(&self, new_lead: NewLead) -> Result<Lead, PersistenceError>;

    /// Once a call has been placed for a known lead, stamp it `contacted`.
    /// Errors here are logged by the caller, never failed back to the job.
    async fn mark_lead_called(&self, lead_id: Uuid, call_sid: &str) -> Result<(), PersistenceError>;

    /// On the first transcript for a call, best-effort-link the lead
    /// matching the call's `to_number` by phone if it doesn't already have
    /// a `call_sid`. No-op if the call is already linked to some lead.
    async fn link_lead_for_call(&self, call_sid: &str) -> Result<(), PersistenceError>;

    /// Leads that have never had a call placed, oldest-first: `status=new`,
    /// `call_sid IS NULL`, non-empty phone.
    async fn leads_without_calls(&self, limit: i64) -> Result<Vec<Lead>, PersistenceError>;
}

pub struct LinkagePersistenceLayer {
    pool: sqlx::PgPool,
}

impl LinkagePersistenceLayer {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn find_call_event_by_sid(&self, call_sid: &str) -> Result<Option<CallEvent>, PersistenceError> {
        let row = sqlx::query_as::<_, CallEventRow>(
            r#"SELECT * FROM call_events WHERE call_sid = $1"#,
        )
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(row.map(CallEventRow::into_domain))
    }

    /// If no `CallEvent` exists for `call_sid`, create a minimal one with
    /// status `in-progress` so the transcript's foreign key is always
    /// satisfiable.
    async fn ensure_call_event_exists(&self, call_sid: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO call_events (
                id, call_sid, status, direction, from_number, to_number, last_event_at, created_at, updated_at
            ) VALUES ($1, $2, 'in-progress', 'outbound', '', '', NOW(), NOW(), NOW())
            ON CONFLICT (call_sid) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(call_sid)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceLayer for LinkagePersistenceLayer {
    async fn upsert_call_event(
        &self,
        lead_id: Option<Uuid>,
        job_id: Option<Uuid>,
        payload: StatusWebhookPayload,
    ) -> Result<CallEvent, PersistenceError> {
        let existing = self.find_call_event_by_sid(&payload.call_sid).await?;

        // A late webhook never regresses a terminal status, but its other
        // non-null fields (duration, recording ids, ...) still merge in.
        // So the status we write is either the incoming one or, if
        // rejected, whatever the row already had.
        let effective_status = if should_apply_status(existing.as_ref().map(|e| e.status), payload.status) {
            payload.status
        } else {
            existing
                .as_ref()
                .expect("should_apply_status only rejects when an existing row was found")
                .status
        };

        let now = Utc::now();
        let row = sqlx::query_as::<_, CallEventRow>(
            r#"
            INSERT INTO call_events (
                id, lead_id, job_id, call_sid, status, direction, from_number, to_number,
                duration_sec, call_duration_sec, recording_url, recording_sid,
                last_event_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13, $13)
            ON CONFLICT (call_sid) DO UPDATE SET
                lead_id = COALESCE(call_events.lead_id, EXCLUDED.lead_id),
                job_id = COALESCE(call_events.job_id, EXCLUDED.job_id),
                status = EXCLUDED.status,
                direction = EXCLUDED.direction,
                from_number = CASE WHEN call_events.from_number = '' THEN EXCLUDED.from_number ELSE call_events.from_number END,
                to_number = CASE WHEN call_events.to_number = '' THEN EXCLUDED.to_number ELSE call_events.to_number END,
                duration_sec = COALESCE(EXCLUDED.duration_sec, call_events.duration_sec),
                call_duration_sec = COALESCE(EXCLUDED.call_duration_sec, call_events.call_duration_sec),
                recording_url = COALESCE(EXCLUDED.recording_url, call_events.recording_url),
                recording_sid = COALESCE(EXCLUDED.recording_sid, call_events.recording_sid),
                last_event_at = EXCLUDED.last_event_at,
                updated_at = EXCLUDED.last_event_at
            RETURNING *
            "#,
        )
        .bind(existing.as_ref().map(|e| e.id).unwrap_or_else(Uuid::new_v4))
        .bind(lead_id.or_else(|| existing.as_ref().and_then(|e| e.lead_id)))
        .bind(job_id.or_else(|| existing.as_ref().and_then(|e| e.job_id)))
        .bind(&payload.call_sid)
        .bind(effective_status)
        .bind(payload.direction)
        .bind(&payload.from)
        .bind(&payload.to)
        .bind(payload.duration_sec)
        .bind(payload.call_duration_sec)
        .bind(&payload.recording_url)
        .bind(&payload.recording_sid)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;

        Ok(row.into_domain())
    }

    async fn append_transcript_entry(
        &self,
        entry: NewTranscriptEntry,
    ) -> Result<TranscriptEntry, PersistenceError> {
        self.ensure_call_event_exists(&entry.call_sid).await?;

        // Only dedup by (call_sid, provider_message_id) when the AI peer
        // actually supplied a message id. Without one there's nothing to
        // key a replay against, so every call is a distinct insert rather
        // than risking collapsing separate turns into one row.
        let row = if let Some(provider_message_id) = &entry.provider_message_id {
            sqlx::query_as::<_, TranscriptEntryRow>(
                r#"
                INSERT INTO conversation_transcripts (
                    id, call_sid, provider_message_id, role, content, occurred_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, NOW())
                ON CONFLICT (call_sid, provider_message_id) DO UPDATE SET
                    call_sid = conversation_transcripts.call_sid
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&entry.call_sid)
            .bind(provider_message_id)
            .bind(entry.role)
            .bind(&entry.content)
            .bind(entry.occurred_at)
            .fetch_one(&self.pool)
            .await
            .map_err(PersistenceError::from_db)?
        } else {
            sqlx::query_as::<_, TranscriptEntryRow>(
                r#"
                INSERT INTO conversation_transcripts (
                    id, call_sid, provider_message_id, role, content, occurred_at, created_at
                ) VALUES ($1, $2, NULL, $3, $4, $5, NOW())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&entry.call_sid)
            .bind(entry.role)
            .bind(&entry.content)
            .bind(entry.occurred_at)
            .fetch_one(&self.pool)
            .await
            .map_err(PersistenceError::from_db)?
        };

        Ok(row.into_domain())
    }

    async fn upsert_recording(
        &self,
        payload: RecordingWebhookPayload,
    ) -> Result<CallRecording, PersistenceError> {
        let row = sqlx::query_as::<_, CallRecordingRow>(
            r#"
            INSERT INTO call_recordings (
                call_sid, recording_sid, status, duration_sec, recording_url, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (recording_sid) DO UPDATE SET
                status = EXCLUDED.status,
                duration_sec = COALESCE(EXCLUDED.duration_sec, call_recordings.duration_sec),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&payload.call_sid)
        .bind(&payload.recording_sid)
        .bind(payload.status)
        .bind(payload.duration_sec)
        .bind(Option::<String>::None)
        .fetch_one(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;

        Ok(row.into_domain())
    }

    async fn find_lead_by_phone(&self, phone_number: &str) -> Result<Option<Lead>, PersistenceError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"SELECT * FROM leads WHERE phone_number = $1 ORDER BY created_at DESC LIMIT 1"#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(lead)
    }

    async fn create_lead(&self, new_lead: NewLead) -> Result<Lead, PersistenceError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (
                id, name, email, phone_number, company, source, source_detail,
                status, priority, notes, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'new', $8, $9, $10, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_lead.name)
        .bind(&new_lead.email)
        .bind(&new_lead.phone_number)
        .bind(&new_lead.company)
        .bind(&new_lead.source)
        .bind(&new_lead.source_detail)
        .bind(new_lead.priority)
        .bind(&new_lead.notes)
        .bind(&new_lead.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(lead)
    }

    async fn mark_lead_called(&self, lead_id: Uuid, call_sid: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            UPDATE leads
            SET call_sid = $1, status = $2, last_contacted_at = NOW(), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(call_sid)
        .bind(LeadStatus::Contacted)
        .bind(lead_id)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(())
    }

    async fn link_lead_for_call(&self, call_sid: &str) -> Result<(), PersistenceError> {
        let already_linked: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM leads WHERE call_sid = $1"#)
                .bind(call_sid)
                .fetch_one(&self.pool)
                .await
                .map_err(PersistenceError::from_db)?;
        if already_linked > 0 {
            return Ok(());
        }

        let to_number: Option<String> =
            sqlx::query_scalar(r#"SELECT to_number FROM call_events WHERE call_sid = $1"#)
                .bind(call_sid)
                .fetch_optional(&self.pool)
                .await
                .map_err(PersistenceError::from_db)?
                .flatten();
        let Some(to_number) = to_number.filter(|n| !n.is_empty()) else {
            return Ok(());
        };

        sqlx::query(
            r#"
            UPDATE leads
            SET call_sid = $1, status = 'contacted', last_contacted_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM leads
                WHERE phone_number = $2 AND call_sid IS NULL
                ORDER BY created_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(call_sid)
        .bind(&to_number)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(())
    }

    async fn leads_without_calls(&self, limit: i64) -> Result<Vec<Lead>, PersistenceError> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE status = 'new'
              AND call_sid IS NULL
              AND phone_number IS NOT NULL
              AND phone_number != ''
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistenceError::from_db)?;
        Ok(leads)
    }
}

#[derive(sqlx::FromRow)]
struct CallEventRow {
    id: Uuid,
    lead_id: Option<Uuid>,
    job_id: Option<Uuid>,
    call_sid: String,
    status: twilio::CallStatus,
    direction: twilio::CallDirection,
    from_number: String,
    to_number: String,
    duration_sec: Option<i64>,
    call_duration_sec: Option<i64>,
    recording_url: Option<String>,
    recording_sid: Option<String>,
    last_event_at: chrono::DateTime<Utc>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl CallEventRow {
    fn into_domain(self) -> CallEvent {
        CallEvent {
            id: self.id,
            lead_id: self.lead_id,
            job_id: self.job_id,
            call_sid: self.call_sid,
            status: self.status,
            direction: self.direction,
            from_number: self.from_number,
            to_number: self.to_number,
            duration_sec: self.duration_sec,
            call_duration_sec: self.call_duration_sec,
            recording_url: self.recording_url,
            recording_sid: self.recording_sid,
            last_event_at: self.last_event_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TranscriptEntryRow {
    id: Uuid,
    call_sid: String,
    provider_message_id: Option<String>,
    role: TranscriptRole,
    content: String,
    occurred_at: chrono::DateTime<Utc>,
    created_at: chrono::DateTime<Utc>,
}

impl TranscriptEntryRow {
    fn into_domain(self) -> TranscriptEntry {
        TranscriptEntry {
            id: self.id,
            call_sid: self.call_sid,
            provider_message_id: self.provider_message_id,
            role: self.role,
            content: self.content,
            occurred_at: self.occurred_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CallRecordingRow {
    call_sid: String,
    recording_sid: String,
    status: twilio::RecordingStatus,
    duration_sec: Option<i64>,
    recording_url: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl CallRecordingRow {
    fn into_domain(self) -> CallRecording {
        CallRecording {
            call_sid: self.call_sid,
            recording_sid: self.recording_sid,
            status: self.status,
            duration_sec: self.duration_sec,
            recording_url: self.recording_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
