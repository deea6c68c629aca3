use std::time::Duration;

use rand::Rng;

/// Reconnect delay schedule: wait `current + jitter`, then double `current`
/// up to `max`. `reset` returns to `base` after a successful handshake.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter_ms: u64,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter_ms: u64) -> Self {
        Self {
            base,
            max,
            jitter_ms,
            current: base,
        }
    }

    /// Delay before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        let delay = self.current + Duration::from_millis(jitter);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Base delay the next attempt will use, before jitter.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
