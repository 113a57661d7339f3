//! Token-bucket rate limiter guarding the Worker Pool's call-placement
//! throughput.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A simple token bucket: `capacity` tokens refill over `window`, drained one
/// at a time by `try_acquire`.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        let refill_per_sec = capacity as f64 / window.as_secs_f64().max(0.001);
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempt to take one token. Returns `false` if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_and_blocks_once_empty() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire());
    }
}
