//! In-process publish/subscribe bus.
//!
//! Carries the two cross-component signals of the pipeline:
//!   - `NotificationAccepted`: a new record landed in the store and should be
//!     presented (toast, badge refresh).
//!   - `StoreChanged`: the store was written; carries the recomputed unread
//!     count so independent views can resync without polling.
//!
//! Broadcast subscribers that fall more than `BUS_CAPACITY` events behind
//! skip the oldest ones. The toast surface must see every accepted record in
//! order, so a bus built with `with_delivery` also queues accepted records on
//! an unbounded channel that never skips.

use tokio::sync::{broadcast, mpsc};

use crate::models::notification::NotificationRecord;

const BUS_CAPACITY: usize = 256;

/// Ordered feed of every accepted record.
pub type Deliveries = mpsc::UnboundedReceiver<NotificationRecord>;

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    NotificationAccepted(NotificationRecord),
    StoreChanged { unread_count: u64 },
}

/// Cheaply-cloneable handle to the bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    delivery: Option<mpsc::UnboundedSender<NotificationRecord>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx, delivery: None }
    }

    /// Bus plus the receiving end of its accepted-record feed.
    pub fn with_delivery() -> (Self, Deliveries) {
        let (delivery, deliveries) = mpsc::unbounded_channel();
        let mut bus = Self::new();
        bus.delivery = Some(delivery);
        (bus, deliveries)
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: BusEvent) {
        if let (BusEvent::NotificationAccepted(record), Some(delivery)) = (&event, &self.delivery) {
            if delivery.send(record.clone()).is_err() {
                tracing::debug!(id = %record.id, "bus: delivery feed closed");
            }
        }
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(receivers, "bus: event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
