//! Turn-latency tracking for a bridge session: time from the caller
//! finishing a turn to the AI's first audio byte back.

use std::time::Instant;

use tracing::info;

#[derive(Default)]
pub struct TurnMetrics {
    turn_started_at: Option<Instant>,
    turns_observed: u32,
    total_latency_ms: u64,
}

impl TurnMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call when the caller's audio stream goes quiet (end of their turn).
    pub fn mark_turn_start(&mut self) {
        self.turn_started_at = Some(Instant::now());
    }

    /// Call on the AI realtime peer's first audio byte of its reply.
    /// Records the latency and resets for the next turn.
    pub fn mark_first_ai_audio(&mut self, call_sid: &str) {
        if let Some(start) = self.turn_started_at.take() {
            let latency = start.elapsed();
            self.turns_observed += 1;
            self.total_latency_ms += latency.as_millis() as u64;
            info!(
                call_sid = %call_sid,
                latency_ms = latency.as_millis(),
                "turn latency"
            );
        }
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.turns_observed == 0 {
            None
        } else {
            Some(self.total_latency_ms as f64 / self.turns_observed as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn records_latency_across_turns() {
        let mut metrics = TurnMetrics::new();
        assert_eq!(metrics.average_latency_ms(), None);

        metrics.mark_turn_start();
        sleep(Duration::from_millis(5));
        metrics.mark_first_ai_audio("CA1");

        assert!(metrics.average_latency_ms().unwrap() >= 5.0);
    }

    #[test]
    fn ignores_ai_audio_with_no_open_turn() {
        let mut metrics = TurnMetrics::new();
        metrics.mark_first_ai_audio("CA1");
        assert_eq!(metrics.average_latency_ms(), None);
    }
}
