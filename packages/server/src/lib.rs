//! Call orchestration engine: a durable job queue and worker pool places
//! outbound calls through a telephony provider, bridges the resulting
//! media stream to a realtime AI peer, and persists everything that
//! happens along the way.

pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod persistence;
pub mod scheduler;
pub mod telephony;

pub use config::*;
