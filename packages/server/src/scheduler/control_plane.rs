//! `ControlPlane`: pause/resume switch checked by the cron tasks before
//! they enqueue any work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPlaneState {
    Running,
    Paused,
}

#[derive(Clone)]
pub struct ControlPlane {
    paused: Arc<AtomicBool>,
}

impl ControlPlane {
    pub fn new() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> ControlPlaneState {
        if self.paused.load(Ordering::SeqCst) {
            ControlPlaneState::Paused
        } else {
            ControlPlaneState::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlPlaneState::Paused
    }
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_and_toggles() {
        let plane = ControlPlane::new();
        assert_eq!(plane.state(), ControlPlaneState::Running);
        plane.pause();
        assert!(plane.is_paused());
        plane.resume();
        assert!(!plane.is_paused());
    }
}
