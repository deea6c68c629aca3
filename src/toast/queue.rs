//! Toast queue state machine.
//!
//! Per toast: `queued → visible → (expired | user-dismissed | closed-all) → removed`.
//!
//! Pure and clock-agnostic: every operation takes `now` and returns the
//! `ToastEvent`s it produced. `ToastManager` owns the clock and the timer task.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::models::toast::ToastViewModel;

use super::rate_limit::SlidingWindow;

/// CSS class applied before detaching a toast when motion is allowed.
pub const REMOVAL_CLASS: &str = "hide";

#[derive(Debug, Clone)]
pub struct ToastConfig {
    /// Max toasts on screen at once. Default: 3.
    pub max_visible: usize,
    /// Countdown before auto-dismiss. Default: 6s.
    pub auto_dismiss: Duration,
    /// Rolling window for the admission limit. Default: 30s.
    pub rate_window: Duration,
    /// Admissions allowed per window. Default: 6.
    pub rate_max: usize,
    /// Remove toasts without a transition.
    pub reduced_motion: bool,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            max_visible: 3,
            auto_dismiss: Duration::from_millis(6000),
            rate_window: Duration::from_secs(30),
            rate_max: 6,
            reduced_motion: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    Expired,
    User,
    ClosedAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// Detach right away (reduced motion).
    Immediate,
    /// Apply `REMOVAL_CLASS`, then detach.
    Transition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToastEvent {
    Shown(ToastViewModel),
    Removed {
        id: String,
        reason: DismissReason,
        removal: Removal,
    },
    Suppressed { id: String },
    RateLimited { id: String },
    ClosedAll,
    /// The close-all affordance should be shown (`true`) or hidden.
    CloseAllVisibility { visible: bool },
}

impl ToastEvent {
    /// Lifecycle name reported to the metrics sink.
    pub fn metric(&self) -> Option<&'static str> {
        match self {
            ToastEvent::Shown(_) => Some("shown"),
            ToastEvent::Removed { .. } => Some("dismissed"),
            ToastEvent::Suppressed { .. } => Some("suppressed"),
            ToastEvent::RateLimited { .. } => Some("rate_limited"),
            ToastEvent::ClosedAll => Some("closed_all"),
            ToastEvent::CloseAllVisibility { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Shown,
    Queued,
    Suppressed,
    RateLimited,
}

/// What is holding a countdown paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Hover,
    Focus,
}

/// Pause/resume countdown. Pausing preserves the remaining time; resuming
/// continues from it.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: Duration,
    running_since: Option<Instant>,
    hovered: bool,
    focused: bool,
}

impl Countdown {
    fn start(duration: Duration, now: Instant) -> Self {
        Self {
            remaining: duration,
            running_since: Some(now),
            hovered: false,
            focused: false,
        }
    }

    /// When the toast expires, or `None` while paused.
    pub fn deadline(&self) -> Option<Instant> {
        self.running_since.map(|since| since + self.remaining)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self
                .remaining
                .saturating_sub(now.saturating_duration_since(since)),
            None => self.remaining,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.running_since.is_none()
    }

    fn hold(&mut self, hold: Hold, now: Instant) {
        match hold {
            Hold::Hover => self.hovered = true,
            Hold::Focus => self.focused = true,
        }
        if self.running_since.is_some() {
            self.remaining = self.remaining(now);
            self.running_since = None;
        }
    }

    fn release(&mut self, hold: Hold, now: Instant) {
        match hold {
            Hold::Hover => self.hovered = false,
            Hold::Focus => self.focused = false,
        }
        if !self.hovered && !self.focused && self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveToast {
    vm: ToastViewModel,
    countdown: Countdown,
}

pub struct ToastQueue {
    config: ToastConfig,
    visible: Vec<ActiveToast>,
    queued: VecDeque<ToastViewModel>,
    limiter: SlidingWindow,
    close_all_visible: bool,
}

impl ToastQueue {
    pub fn new(mut config: ToastConfig) -> Self {
        config.max_visible = config.max_visible.max(1);
        let limiter = SlidingWindow::new(config.rate_window, config.rate_max);
        Self {
            config,
            visible: Vec::new(),
            queued: VecDeque::new(),
            limiter,
            close_all_visible: false,
        }
    }

    pub fn config(&self) -> &ToastConfig {
        &self.config
    }

    /// Admit a toast: rate limit first, then dedup against visible and
    /// queued, then show or queue.
    pub fn enqueue(&mut self, vm: ToastViewModel, now: Instant) -> (EnqueueOutcome, Vec<ToastEvent>) {
        let mut events = Vec::new();

        if !self.limiter.allows(now) {
            tracing::debug!(id = %vm.id, "toast: rate limited");
            events.push(ToastEvent::RateLimited { id: vm.id });
            return (EnqueueOutcome::RateLimited, events);
        }
        if self.is_visible(&vm.id) || self.is_queued(&vm.id) {
            tracing::debug!(id = %vm.id, "toast: duplicate suppressed");
            events.push(ToastEvent::Suppressed { id: vm.id });
            return (EnqueueOutcome::Suppressed, events);
        }

        self.limiter.record(now);
        let outcome = if self.visible.len() < self.config.max_visible {
            self.show(vm, now, &mut events);
            EnqueueOutcome::Shown
        } else {
            self.queued.push_back(vm);
            EnqueueOutcome::Queued
        };
        self.sync_close_all(&mut events);
        (outcome, events)
    }

    /// Remove a visible toast and promote the head of the queue.
    /// Unknown or merely queued ids are ignored.
    pub fn dismiss(&mut self, id: &str, reason: DismissReason, now: Instant) -> Vec<ToastEvent> {
        let mut events = Vec::new();
        self.remove_visible(id, reason, now, &mut events);
        self.sync_close_all(&mut events);
        events
    }

    /// Key handling on a focused toast. Only Escape does anything.
    pub fn key_down(&mut self, id: &str, key: &str, now: Instant) -> Vec<ToastEvent> {
        if key == "Escape" {
            self.dismiss(id, DismissReason::User, now)
        } else {
            Vec::new()
        }
    }

    /// Dismiss every visible toast and drop the queue without showing it.
    pub fn close_all(&mut self, now: Instant) -> Vec<ToastEvent> {
        let mut events = Vec::new();
        self.queued.clear();
        let ids: Vec<String> = self.visible.iter().map(|t| t.vm.id.clone()).collect();
        for id in ids {
            self.remove_visible(&id, DismissReason::ClosedAll, now, &mut events);
        }
        events.push(ToastEvent::ClosedAll);
        self.sync_close_all(&mut events);
        events
    }

    /// Pause a toast's countdown. Returns whether the toast is visible.
    pub fn hold(&mut self, id: &str, hold: Hold, now: Instant) -> bool {
        match self.visible.iter_mut().find(|t| t.vm.id == id) {
            Some(toast) => {
                toast.countdown.hold(hold, now);
                true
            }
            None => false,
        }
    }

    /// Release a pause source; the countdown resumes once none remain.
    pub fn release(&mut self, id: &str, hold: Hold, now: Instant) -> bool {
        match self.visible.iter_mut().find(|t| t.vm.id == id) {
            Some(toast) => {
                toast.countdown.release(hold, now);
                true
            }
            None => false,
        }
    }

    /// Dismiss every toast whose countdown has run out by `now`.
    pub fn expire_due(&mut self, now: Instant) -> Vec<ToastEvent> {
        let mut due: Vec<(Instant, String)> = self
            .visible
            .iter()
            .filter_map(|t| t.countdown.deadline().map(|d| (d, t.vm.id.clone())))
            .filter(|(deadline, _)| *deadline <= now)
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);

        let mut events = Vec::new();
        for (_, id) in due {
            self.remove_visible(&id, DismissReason::Expired, now, &mut events);
        }
        self.sync_close_all(&mut events);
        events
    }

    /// Earliest running deadline, if any countdown is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.visible
            .iter()
            .filter_map(|t| t.countdown.deadline())
            .min()
    }

    pub fn visible(&self) -> Vec<ToastViewModel> {
        self.visible.iter().map(|t| t.vm.clone()).collect()
    }

    pub fn queued(&self) -> Vec<ToastViewModel> {
        self.queued.iter().cloned().collect()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visible.iter().any(|t| t.vm.id == id)
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.queued.iter().any(|vm| vm.id == id)
    }

    pub fn countdown(&self, id: &str) -> Option<&Countdown> {
        self.visible
            .iter()
            .find(|t| t.vm.id == id)
            .map(|t| &t.countdown)
    }

    pub fn close_all_visible(&self) -> bool {
        self.close_all_visible
    }

    fn show(&mut self, vm: ToastViewModel, now: Instant, events: &mut Vec<ToastEvent>) {
        tracing::debug!(id = %vm.id, "toast: shown");
        events.push(ToastEvent::Shown(vm.clone()));
        self.visible.push(ActiveToast {
            vm,
            countdown: Countdown::start(self.config.auto_dismiss, now),
        });
    }

    fn remove_visible(
        &mut self,
        id: &str,
        reason: DismissReason,
        now: Instant,
        events: &mut Vec<ToastEvent>,
    ) {
        let Some(idx) = self.visible.iter().position(|t| t.vm.id == id) else {
            return;
        };
        let toast = self.visible.remove(idx);
        let removal = if self.config.reduced_motion {
            Removal::Immediate
        } else {
            Removal::Transition
        };
        tracing::debug!(id = %toast.vm.id, ?reason, "toast: dismissed");
        events.push(ToastEvent::Removed {
            id: toast.vm.id,
            reason,
            removal,
        });

        if let Some(next) = self.queued.pop_front() {
            self.show(next, now, events);
        }
    }

    fn sync_close_all(&mut self, events: &mut Vec<ToastEvent>) {
        let visible = self.visible.len() + self.queued.len() > 1;
        if visible != self.close_all_visible {
            self.close_all_visible = visible;
            events.push(ToastEvent::CloseAllVisibility { visible });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: &str) -> ToastViewModel {
        ToastViewModel {
            id: id.to_string(),
            title: format!("title {}", id),
            message: String::new(),
            actions: Vec::new(),
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ids(list: Vec<ToastViewModel>) -> Vec<String> {
        list.into_iter().map(|v| v.id).collect()
    }

    #[test]
    fn test_bounded_visibility_and_fifo_promotion() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        let outcomes: Vec<EnqueueOutcome> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| q.enqueue(vm(id), t0).0)
            .collect();
        assert_eq!(
            outcomes,
            vec![
                EnqueueOutcome::Shown,
                EnqueueOutcome::Shown,
                EnqueueOutcome::Shown,
                EnqueueOutcome::Queued,
                EnqueueOutcome::Queued
            ]
        );
        assert_eq!(q.visible_len(), 3);
        assert_eq!(q.queued_len(), 2);

        let events = q.dismiss("b", DismissReason::User, t0 + ms(100));
        assert!(events.contains(&ToastEvent::Shown(vm("d"))));
        assert_eq!(ids(q.visible()), vec!["a", "c", "d"]);
        assert_eq!(ids(q.queued()), vec!["e"]);
    }

    #[test]
    fn test_rate_limit_rejects_seventh_in_window() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        let mut accepted = 0;
        let mut shown = 0;
        let mut last = EnqueueOutcome::Shown;
        for i in 0..7 {
            let (outcome, events) = q.enqueue(vm(&format!("n{}", i)), t0 + ms(i * 1000));
            shown += events.iter().filter(|e| matches!(e, ToastEvent::Shown(_))).count();
            if matches!(outcome, EnqueueOutcome::Shown | EnqueueOutcome::Queued) {
                accepted += 1;
            }
            last = outcome;
        }
        assert_eq!(accepted, 6);
        assert_eq!(last, EnqueueOutcome::RateLimited);
        assert_eq!(shown, 3);
        assert_eq!(q.visible_len() + q.queued_len(), 6);
        assert!(!q.is_queued("n6") && !q.is_visible("n6"));
    }

    #[test]
    fn test_rate_limit_recovers_after_window() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        for i in 0..6 {
            q.enqueue(vm(&format!("n{}", i)), t0);
        }
        assert_eq!(q.enqueue(vm("late"), t0 + ms(29_999)).0, EnqueueOutcome::RateLimited);
        assert_eq!(q.enqueue(vm("later"), t0 + ms(30_000)).0, EnqueueOutcome::Queued);
    }

    #[test]
    fn test_zero_max_visible_still_shows_one() {
        let t0 = Instant::now();
        let config = ToastConfig { max_visible: 0, ..ToastConfig::default() };
        let mut q = ToastQueue::new(config);
        assert_eq!(q.enqueue(vm("a"), t0).0, EnqueueOutcome::Shown);
        assert_eq!(q.enqueue(vm("b"), t0).0, EnqueueOutcome::Queued);
    }

    #[test]
    fn test_duplicate_visible_or_queued_is_suppressed() {
        let t0 = Instant::now();
        let config = ToastConfig { max_visible: 1, ..ToastConfig::default() };
        let mut q = ToastQueue::new(config);
        q.enqueue(vm("a"), t0);
        q.enqueue(vm("b"), t0);

        let (outcome, events) = q.enqueue(vm("a"), t0);
        assert_eq!(outcome, EnqueueOutcome::Suppressed);
        assert_eq!(events, vec![ToastEvent::Suppressed { id: "a".into() }]);

        assert_eq!(q.enqueue(vm("b"), t0).0, EnqueueOutcome::Suppressed);
        assert_eq!(q.visible_len(), 1);
        assert_eq!(q.queued_len(), 1);
    }

    #[test]
    fn test_auto_dismiss_after_countdown() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        q.enqueue(vm("a"), t0);
        assert_eq!(q.next_deadline(), Some(t0 + ms(6000)));
        assert!(q.expire_due(t0 + ms(5999)).is_empty());

        let events = q.expire_due(t0 + ms(6000));
        assert_eq!(
            events,
            vec![ToastEvent::Removed {
                id: "a".into(),
                reason: DismissReason::Expired,
                removal: Removal::Transition,
            }]
        );
        assert_eq!(q.visible_len(), 0);
    }

    #[test]
    fn test_pause_resume_preserves_remaining() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        q.enqueue(vm("a"), t0);

        assert!(q.hold("a", Hold::Hover, t0 + ms(2000)));
        assert!(q.countdown("a").unwrap().is_paused());
        assert_eq!(q.next_deadline(), None);
        assert!(q.expire_due(t0 + ms(6000)).is_empty());

        assert!(q.release("a", Hold::Hover, t0 + ms(4000)));
        assert_eq!(q.next_deadline(), Some(t0 + ms(8000)));
        assert!(q.expire_due(t0 + ms(7999)).is_empty());
        assert_eq!(q.expire_due(t0 + ms(8000)).len(), 1);
    }

    #[test]
    fn test_hover_and_focus_both_hold() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        q.enqueue(vm("a"), t0);

        q.hold("a", Hold::Hover, t0 + ms(1000));
        q.hold("a", Hold::Focus, t0 + ms(1500));
        q.release("a", Hold::Hover, t0 + ms(2000));
        // Still focused: stays paused with 5s left.
        assert!(q.countdown("a").unwrap().is_paused());
        assert_eq!(q.countdown("a").unwrap().remaining(t0 + ms(2000)), ms(5000));

        q.release("a", Hold::Focus, t0 + ms(3000));
        assert_eq!(q.next_deadline(), Some(t0 + ms(8000)));
    }

    #[test]
    fn test_escape_dismisses_other_keys_do_not() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        q.enqueue(vm("a"), t0);
        assert!(q.key_down("a", "Enter", t0).is_empty());
        let events = q.key_down("a", "Escape", t0);
        assert!(matches!(
            events[0],
            ToastEvent::Removed { reason: DismissReason::User, .. }
        ));
        assert_eq!(q.visible_len(), 0);
    }

    #[test]
    fn test_close_all_clears_queue_without_showing_it() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        for id in ["a", "b", "c", "d", "e"] {
            q.enqueue(vm(id), t0);
        }
        assert!(q.close_all_visible());

        let events = q.close_all(t0 + ms(10));
        assert!(!events.iter().any(|e| matches!(e, ToastEvent::Shown(_))));
        let removed = events
            .iter()
            .filter(|e| matches!(e, ToastEvent::Removed { reason: DismissReason::ClosedAll, .. }))
            .count();
        assert_eq!(removed, 3);
        assert!(events.contains(&ToastEvent::ClosedAll));
        assert!(events.contains(&ToastEvent::CloseAllVisibility { visible: false }));
        assert_eq!(q.visible_len() + q.queued_len(), 0);
    }

    #[test]
    fn test_close_all_affordance_tracks_total() {
        let t0 = Instant::now();
        let mut q = ToastQueue::new(ToastConfig::default());
        let (_, events) = q.enqueue(vm("a"), t0);
        assert!(!events.iter().any(|e| matches!(e, ToastEvent::CloseAllVisibility { .. })));
        let (_, events) = q.enqueue(vm("b"), t0);
        assert!(events.contains(&ToastEvent::CloseAllVisibility { visible: true }));
        let events = q.dismiss("a", DismissReason::User, t0);
        assert!(events.contains(&ToastEvent::CloseAllVisibility { visible: false }));
    }

    #[test]
    fn test_reduced_motion_removes_immediately() {
        let t0 = Instant::now();
        let config = ToastConfig { reduced_motion: true, ..ToastConfig::default() };
        let mut q = ToastQueue::new(config);
        q.enqueue(vm("a"), t0);
        let events = q.dismiss("a", DismissReason::User, t0);
        assert!(matches!(
            events[0],
            ToastEvent::Removed { removal: Removal::Immediate, .. }
        ));
    }

    #[test]
    fn test_dismissing_queued_id_is_ignored() {
        let t0 = Instant::now();
        let config = ToastConfig { max_visible: 1, ..ToastConfig::default() };
        let mut q = ToastQueue::new(config);
        q.enqueue(vm("a"), t0);
        q.enqueue(vm("b"), t0);
        assert!(q.dismiss("b", DismissReason::User, t0).is_empty());
        assert!(q.is_queued("b"));
    }

    #[test]
    fn test_promoted_toast_gets_full_countdown() {
        let t0 = Instant::now();
        let config = ToastConfig { max_visible: 1, ..ToastConfig::default() };
        let mut q = ToastQueue::new(config);
        q.enqueue(vm("a"), t0);
        q.enqueue(vm("b"), t0);
        q.expire_due(t0 + ms(6000));
        assert!(q.is_visible("b"));
        assert_eq!(q.next_deadline(), Some(t0 + ms(12_000)));
    }
}
