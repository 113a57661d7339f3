//! Domain entities persisted by the Linkage & Persistence Layer: the lead
//! being called, the call's event history, its transcript, and its
//! recording.

pub mod call_event;
pub mod lead;
pub mod recording;
pub mod transcript;

pub use call_event::CallEvent;
pub use lead::Lead;
pub use recording::CallRecording;
pub use transcript::TranscriptEntry;
