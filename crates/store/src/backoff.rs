use std::time::Duration;

use rand::Rng;

const MIN_BASE: Duration = Duration::from_millis(1);

/// Exponential retry delay: doubles per failure up to `max`, with equal jitter in
/// `[d/2, d]`. Reset after a successful list.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// `base` is raised to at least 1ms so retries never spin.
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(MIN_BASE);
        Self { base, max: max.max(base), attempt: 0 }
    }

    pub fn attempt(&self) -> u32 { self.attempt }

    pub fn reset(&mut self) { self.attempt = 0; }

    /// Upper bound of the next delay, before jitter.
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn next_delay(&mut self) -> Duration {
        let d = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);
        let ms = d.as_millis() as u64;
        if ms < 2 {
            return d;
        }
        Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
    }
}
