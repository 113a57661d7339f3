//! Typed, per-layer errors for the call orchestration engine.
//!
//! Library modules return these `thiserror` enums; the HTTP/bin layer
//! collapses them into `anyhow::Result` with `.context(...)`, matching the
//! split already used throughout the reference server.

use thiserror::Error;
use uuid::Uuid;

/// Errors from the Job Store.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("invalid job options: {0}")]
    InvalidOptions(String),

    #[error("bulk enqueue failed, no jobs were inserted: {0}")]
    BulkInsertFailed(String),
}

/// Errors from the Telephony Gateway adapter.
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("provider request failed: {0}")]
    Provider(#[from] twilio::TwilioError),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors from the Linkage & Persistence Layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl PersistenceError {
    /// Maps a unique-constraint violation (e.g. two leads racing to claim
    /// the same `call_sid`) to an invariant violation rather than a bare
    /// database error.
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return PersistenceError::InvariantViolation(db_err.to_string());
            }
        }
        PersistenceError::Database(err)
    }
}

/// Errors from the Media Bridge session state machine.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to connect to AI realtime peer: {0}")]
    ConnectFailed(String),

    #[error("provider socket closed unexpectedly")]
    ProviderClosed,

    #[error("AI socket closed unexpectedly: code={code:?}")]
    AiSocketClosed { code: Option<u16> },

    #[error("session already in a terminal state")]
    AlreadyTerminal,
}

// `ErrorKind` (retryable / non-retryable / cancelled) lives in
// `crate::jobs::model` alongside the `Job` it classifies; this impl just
// teaches it how to read a `TelephonyError`.
impl From<&TelephonyError> for crate::jobs::model::ErrorKind {
    fn from(err: &TelephonyError) -> Self {
        use crate::jobs::model::ErrorKind;
        match err {
            TelephonyError::Provider(e) if e.is_retryable() => ErrorKind::Retryable,
            TelephonyError::Provider(_) => ErrorKind::NonRetryable,
            TelephonyError::Validation(_) => ErrorKind::NonRetryable,
        }
    }
}
