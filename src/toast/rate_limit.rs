//! Sliding-window limiter for toast admissions.
//!
//! Keeps the instants of recent admissions and drops the ones older than the
//! window on every check, so the limit is continuous rather than reset at
//! fixed boundaries.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: Duration,
    max_events: usize,
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(window: Duration, max_events: usize) -> Self {
        Self {
            window,
            max_events,
            hits: VecDeque::with_capacity(max_events),
        }
    }

    /// Whether one more event fits in the window ending at `now`.
    pub fn allows(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.hits.len() < self.max_events
    }

    /// Record an admitted event.
    pub fn record(&mut self, now: Instant) {
        self.hits.push_back(now);
    }

    /// Events currently inside the window.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.hits.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}
