//! Reconnection backoff policy.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// Delay for attempt `n` is `base * 2^n`, capped at `cap`, then scaled by
/// a random factor in `[1 - jitter, 1 + jitter]` so a fleet of clients
/// does not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before reconnect attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .as_millis()
            .saturating_mul(1u128 << attempt.min(63))
            .min(self.cap.as_millis()) as u64;

        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };

        Duration::from_millis((exp as f64 * factor) as u64)
    }
}

impl Default for Backoff {
    /// 1 s base, 60 s cap, 20% jitter.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        assert_eq!(b.delay(10), Duration::from_secs(60));
        assert_eq!(b.delay(63), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_in_range() {
        let b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.2);
        for attempt in 0..8 {
            let d = b.delay(attempt).as_millis() as f64;
            let nominal = (1000u64 << attempt).min(60_000) as f64;
            assert!(d >= nominal * 0.8 - 1.0, "attempt {}: {} too small", attempt, d);
            assert!(d <= nominal * 1.2 + 1.0, "attempt {}: {} too large", attempt, d);
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let b = Backoff::default();
        let d = b.delay(u32::MAX);
        assert!(d <= Duration::from_secs(73));
    }
}
