//! The Media Bridge: relays bidirectional μ-law audio between the
//! telephony provider's media-stream WebSocket and the AI realtime peer,
//! tracking turn latency and falling back gracefully on AI outages.

pub mod manager;
pub mod metrics;
pub mod provider;
pub mod realtime;
pub mod session;

pub use manager::BridgeManager;
pub use session::{BridgeSession, SessionState};
