//! The `Lead` entity: a contact the engine may place calls to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "lead_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// A callable contact, and the most recent call placed to them, if any.
/// `call_sid` is unique across leads: a call belongs to at most one lead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub source: Option<String>,
    /// Where within `source` the lead came from, e.g. a campaign name.
    /// Optional, never read by core logic — persisted and returned only.
    pub source_detail: Option<String>,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,

    pub call_sid: Option<String>,
    pub last_contacted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when registering a new lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub source: Option<String>,
    pub source_detail: Option<String>,
    #[serde(default)]
    pub priority: LeadPriority,
    pub notes: Option<String>,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}
