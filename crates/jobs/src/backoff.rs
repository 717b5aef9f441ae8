// crates/jobs/src/backoff.rs
//! Poll timing: capped exponential backoff with a hard retry budget.

use std::time::Duration;

/// Timing knobs for one scheduler instance.
///
/// The first status check fires immediately; check `n` (1-based) waits
/// `min(base_delay * backoff_multiplier^(n-1), max_delay)` beforehand.
/// `max_retries` caps the number of checks in one tracking session, which
/// makes the total wait before giving up a fixed, computable bound — there
/// is no separate wall-clock timeout.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.2,
            max_delay: Duration::from_millis(10_000),
            max_retries: 30,
        }
    }
}

impl PollConfig {
    /// Delay before the next check, given how many checks already ran.
    pub fn delay_for(&self, checks_done: u32) -> Duration {
        if checks_done == 0 {
            return Duration::ZERO;
        }
        let base = self.base_delay.as_millis() as f64;
        let scaled = base * self.backoff_multiplier.powi(checks_done as i32 - 1);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }

    /// Upper bound on the total wait across one tracking session.
    pub fn max_total_wait(&self) -> Duration {
        (0..self.max_retries).map(|n| self.delay_for(n)).sum()
    }
}
