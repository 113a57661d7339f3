//! `BridgeSession` state machine: `Init -> Connecting -> Ready -> Streaming
//! -> Closing`, with `Failed` reachable from any non-terminal state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Stored as an atomic so the provider and AI relay tasks can both observe
/// transitions without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Init = 0,
    Connecting = 1,
    Ready = 2,
    Streaming = 3,
    Failed = 4,
    Closing = 5,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Init,
            1 => SessionState::Connecting,
            2 => SessionState::Ready,
            3 => SessionState::Streaming,
            4 => SessionState::Failed,
            _ => SessionState::Closing,
        }
    }

    /// Any state may transition to `Failed` or `Closing`; otherwise only
    /// the forward progression below is legal.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        if matches!(next, Failed | Closing) {
            return !matches!(self, Closing);
        }
        matches!(
            (self, next),
            (Init, Connecting) | (Connecting, Ready) | (Ready, Streaming)
        )
    }
}

pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: SessionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Attempts the transition, returning whether it was legal and applied.
    pub fn transition(&self, next: SessionState) -> bool {
        let current = self.get();
        if !current.can_transition_to(next) {
            return false;
        }
        self.0.store(next as u8, Ordering::SeqCst);
        true
    }
}

/// A single call's media-bridge session: one provider WebSocket paired
/// with one AI realtime WebSocket, keyed by `call_sid` in `BridgeManager`.
pub struct BridgeSession {
    pub call_sid: String,
    state: StateCell,
}

impl BridgeSession {
    pub fn new(call_sid: String) -> Self {
        Self {
            call_sid,
            state: StateCell::new(SessionState::Init),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn transition(&self, next: SessionState) -> bool {
        self.state.transition(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state(), SessionState::Failed | SessionState::Closing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_in_order() {
        let session = BridgeSession::new("CA1".to_string());
        assert!(session.transition(SessionState::Connecting));
        assert!(session.transition(SessionState::Ready));
        assert!(session.transition(SessionState::Streaming));
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn cannot_skip_states() {
        let session = BridgeSession::new("CA1".to_string());
        assert!(!session.transition(SessionState::Streaming));
        assert_eq!(session.state(), SessionState::Init);
    }

    #[test]
    fn any_state_can_fail_except_closing() {
        let session = BridgeSession::new("CA1".to_string());
        session.transition(SessionState::Connecting);
        assert!(session.transition(SessionState::Failed));
        assert!(session.is_terminal());
        // Failed can still close out (the manager does exactly this after
        // sending the terminator marker), but Closing is truly terminal:
        // nothing, including Failed, can follow it.
        assert!(session.transition(SessionState::Closing));
        assert!(!session.transition(SessionState::Failed));
    }
}
