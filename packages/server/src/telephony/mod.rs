//! The Telephony Gateway: the call-orchestration engine's only boundary
//! with the voice provider's REST API and webhooks.

pub mod gateway;
pub mod webhooks;

pub use gateway::TelephonyGateway;
