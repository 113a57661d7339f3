//! The Linkage & Persistence Layer: the only code path allowed to write
//! `CallEvent`, `TranscriptEntry`, and `CallRecording` rows, so the
//! idempotent-upsert invariants hold regardless of which caller (webhook
//! handler, media bridge, worker) produced the write.

mod lp;

pub use lp::{LinkagePersistenceLayer, PersistenceLayer};
