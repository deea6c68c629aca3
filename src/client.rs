//! Explicit wiring of the notification pipeline.
//!
//! `NotifyClient` owns one instance of each component, built once from
//! `Config`, and connects them through the event bus:
//!
//! ```text
//! IngestChannel → NotificationStore::accept → bus
//!     NotificationAccepted → delivery feed → ToastManager::accept
//!     StoreChanged         → Badge::refresh
//! ```
//!
//! Toasts and the badge run on separate tasks. A slow server-mode unread
//! query delays only the badge, and bursts of store writes collapse into a
//! single refresh.
//!
//! UI surfaces reach the pipeline through the handles returned here rather
//! than through process-wide globals.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::badge::{Badge, UnreadAdapter};
use crate::bus::{BusEvent, Deliveries, EventBus};
use crate::center::NotificationCenter;
use crate::config::Config;
use crate::errors::Result;
use crate::metrics::MetricsSink;
use crate::models::notification::NotificationRecord;
use crate::realtime::{IngestChannel, RealtimeConfig};
use crate::store::{InsertOutcome, KvBackend, NotificationStore, ObjectKv};
use crate::toast::ToastManager;

pub struct NotifyClient {
    bus: EventBus,
    /// Held by the running toast pump; a second `start` waits for it.
    deliveries: Arc<Mutex<Deliveries>>,
    store: Arc<NotificationStore>,
    toasts: ToastManager,
    badge: Arc<Badge>,
    realtime: RealtimeConfig,
}

/// Background tasks started by `NotifyClient::start`.
pub struct ClientHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ClientHandle {
    pub fn abort(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl NotifyClient {
    /// Build the pipeline over the store selected by `EF_STORE_URL`.
    pub fn new(cfg: &Config, metrics: Option<Arc<dyn MetricsSink>>) -> anyhow::Result<Self> {
        let kv = ObjectKv::from_url(&cfg.store_url, &cfg.origin())?;
        Self::with_backend(cfg, Arc::new(kv), metrics)
    }

    pub fn with_backend(
        cfg: &Config,
        kv: Arc<dyn KvBackend>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> anyhow::Result<Self> {
        let (bus, deliveries) = EventBus::with_delivery();
        let store = Arc::new(NotificationStore::new(kv, bus.clone(), cfg.store()));
        let toasts = ToastManager::new(cfg.toast(), metrics);
        let adapter = UnreadAdapter::new(
            cfg.mode,
            store.clone(),
            cfg.server_url.clone(),
            cfg.unread_timeout(),
        )?;
        let badge = Arc::new(Badge::new(adapter));

        Ok(Self {
            bus,
            deliveries: Arc::new(Mutex::new(deliveries)),
            store,
            toasts,
            badge,
            realtime: cfg.realtime()?,
        })
    }

    /// Start the toast timer, the toast and badge pumps and (if enabled) live
    /// ingest. The first badge refresh runs on the badge pump, so this never
    /// waits on the network.
    pub async fn start(&self) -> ClientHandle {
        if let Err(e) = self.store.recompute_unread().await {
            tracing::warn!(error = %e, code = e.code(), "client: failed to refresh unread count");
        }

        let mut tasks = vec![
            self.toasts.spawn_timer(),
            self.spawn_toast_pump(),
            self.spawn_badge_pump(),
        ];
        if let Some(ingest) = IngestChannel::new(self.realtime.clone(), self.store.clone()).spawn() {
            tasks.push(ingest);
        }
        tracing::info!(tasks = tasks.len(), "client: started");
        ClientHandle { tasks }
    }

    /// Hand a notification to the pipeline as if it arrived live.
    pub async fn accept(&self, record: NotificationRecord) -> Result<InsertOutcome> {
        self.store.accept(record).await
    }

    /// Open a Notification Center over the shared store. Feed it bus events
    /// through `NotificationCenter::apply_event` to keep it current while open.
    pub async fn center(&self) -> NotificationCenter {
        NotificationCenter::open(self.store.clone()).await
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn toasts(&self) -> &ToastManager {
        &self.toasts
    }

    pub fn badge(&self) -> &Arc<Badge> {
        &self.badge
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn spawn_toast_pump(&self) -> JoinHandle<()> {
        let deliveries = self.deliveries.clone();
        let toasts = self.toasts.clone();

        tokio::spawn(async move {
            let mut rx = deliveries.lock().await;
            while let Some(record) = rx.recv().await {
                toasts.accept(&record);
            }
        })
    }

    fn spawn_badge_pump(&self) -> JoinHandle<()> {
        // Subscribe before spawning so nothing published after `start` is missed.
        let mut rx = self.bus.subscribe();
        let badge = self.badge.clone();

        tokio::spawn(async move {
            badge.refresh().await;
            loop {
                match rx.recv().await {
                    Ok(BusEvent::StoreChanged { unread_count }) => {
                        let pending = drain_pending(&mut rx);
                        tracing::trace!(unread_count, pending, "client: store changed");
                        badge.refresh().await;
                    }
                    Ok(BusEvent::NotificationAccepted(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "client: badge fell behind the bus, resyncing");
                        drain_pending(&mut rx);
                        badge.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Discard events already queued on `rx`. The badge re-reads the count on
/// refresh, so only the latest state matters.
fn drain_pending(rx: &mut broadcast::Receiver<BusEvent>) -> usize {
    let mut drained = 0;
    loop {
        match rx.try_recv() {
            Ok(_) => drained += 1,
            Err(TryRecvError::Lagged(skipped)) => drained += skipped as usize,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return drained,
        }
    }
}
