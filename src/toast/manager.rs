//! Async driver for `ToastQueue`.
//!
//! Owns the clock: UI inputs lock the queue, apply the transition at
//! `Instant::now()`, then fan the resulting events out to subscribers and
//! the metrics sink. A single timer task sleeps until the earliest running
//! countdown and is woken whenever a transition may have moved it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::metrics::{MetricsSink, METRIC_PREFIX};
use crate::models::notification::NotificationRecord;
use crate::models::toast::ToastViewModel;

use super::queue::{DismissReason, EnqueueOutcome, Hold, ToastConfig, ToastEvent, ToastQueue};

const EVENT_CAPACITY: usize = 256;

/// What the toast container currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastSnapshot {
    pub visible: Vec<ToastViewModel>,
    pub queued: Vec<ToastViewModel>,
    pub close_all_visible: bool,
}

struct Shared {
    queue: Mutex<ToastQueue>,
    wake: Notify,
    events: broadcast::Sender<ToastEvent>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

#[derive(Clone)]
pub struct ToastManager {
    inner: Arc<Shared>,
}

impl ToastManager {
    pub fn new(config: ToastConfig, metrics: Option<Arc<dyn MetricsSink>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Shared {
                queue: Mutex::new(ToastQueue::new(config)),
                wake: Notify::new(),
                events,
                metrics,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToastEvent> {
        self.inner.events.subscribe()
    }

    /// Offer a freshly ingested notification to the toast surface.
    pub fn accept(&self, record: &NotificationRecord) -> EnqueueOutcome {
        self.enqueue(ToastViewModel::from_record(record))
    }

    pub fn enqueue(&self, vm: ToastViewModel) -> EnqueueOutcome {
        self.apply(|q, now| q.enqueue(vm, now))
    }

    /// Close button.
    pub fn dismiss(&self, id: &str) {
        self.apply(|q, now| ((), q.dismiss(id, DismissReason::User, now)));
    }

    pub fn key_down(&self, id: &str, key: &str) {
        self.apply(|q, now| ((), q.key_down(id, key, now)));
    }

    pub fn pointer_enter(&self, id: &str) {
        self.hold(id, Hold::Hover);
    }

    pub fn pointer_leave(&self, id: &str) {
        self.release(id, Hold::Hover);
    }

    pub fn focus_in(&self, id: &str) {
        self.hold(id, Hold::Focus);
    }

    pub fn focus_out(&self, id: &str) {
        self.release(id, Hold::Focus);
    }

    pub fn close_all(&self) {
        self.apply(|q, now| ((), q.close_all(now)));
    }

    pub fn snapshot(&self) -> ToastSnapshot {
        let q = self.lock();
        ToastSnapshot {
            visible: q.visible(),
            queued: q.queued(),
            close_all_visible: q.close_all_visible(),
        }
    }

    /// Start the auto-dismiss timer. Runs for the lifetime of the runtime.
    pub fn spawn_timer(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_timer().await })
    }

    async fn run_timer(&self) {
        loop {
            let deadline = self.lock().next_deadline();
            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            self.apply(|q, now| ((), q.expire_due(now)));
                        }
                        _ = self.inner.wake.notified() => {}
                    }
                }
                None => self.inner.wake.notified().await,
            }
        }
    }

    fn hold(&self, id: &str, hold: Hold) {
        let found = {
            let mut q = self.lock();
            q.hold(id, hold, Instant::now())
        };
        if found {
            self.inner.wake.notify_one();
        }
    }

    fn release(&self, id: &str, hold: Hold) {
        let found = {
            let mut q = self.lock();
            q.release(id, hold, Instant::now())
        };
        if found {
            self.inner.wake.notify_one();
        }
    }

    fn apply<R>(&self, f: impl FnOnce(&mut ToastQueue, Instant) -> (R, Vec<ToastEvent>)) -> R {
        let (result, events) = {
            let mut q = self.lock();
            f(&mut *q, Instant::now())
        };
        self.emit(events);
        self.inner.wake.notify_one();
        result
    }

    fn emit(&self, events: Vec<ToastEvent>) {
        for event in events {
            if let (Some(sink), Some(name)) = (&self.inner.metrics, event.metric()) {
                let metric = format!("{}{}", METRIC_PREFIX, name);
                if let Err(e) = sink.count(&metric) {
                    tracing::debug!(metric = %metric, error = %e, "toast: metrics sink failed");
                }
            }
            // No subscribers is fine: the UI may not be attached.
            let _ = self.inner.events.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ToastQueue> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
