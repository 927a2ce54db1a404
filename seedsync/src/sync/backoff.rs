//! Bounded exponential backoff with jitter for failed sync attempts.

use rand::Rng;
use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Backoff sized for a sync interval: retries start at one second and
    /// never wait longer than eight sync intervals (or ten minutes).
    pub fn for_sync_interval(interval: Duration) -> Self {
        Self::new(BASE_DELAY, interval.saturating_mul(8).min(MAX_DELAY))
    }

    /// Record a failure and return how long to wait before the next attempt.
    /// The result lies in `[d/2, d]` where `d` doubles per failure up to the
    /// cap.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.failures = self.failures.saturating_add(1);

        let ceiling_ms = ceiling.as_millis().max(1) as u64;
        let jittered = rand::thread_rng().gen_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }

    /// Un-jittered delay for the next failure.
    fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
