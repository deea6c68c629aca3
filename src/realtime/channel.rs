//! Reconnecting ingest loop.
//!
//! Connects, sends `hello` with the stored resume cursor, then feeds every
//! `notif` frame into the store's accept path, which publishes freshly
//! inserted records on the bus. Duplicates are dropped silently.
//! Any close or error waits out the backoff and reconnects, forever.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::store::{InsertOutcome, NotificationStore};

use super::backoff::Backoff;
use super::protocol::{Inbound, Outbound};

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Socket endpoint. `None` disables live delivery.
    pub url: Option<Url>,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub jitter_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_base: Duration::from_millis(1000),
            reconnect_max: Duration::from_millis(30_000),
            jitter_ms: 1000,
        }
    }
}

pub struct IngestChannel {
    config: RealtimeConfig,
    store: Arc<NotificationStore>,
}

impl IngestChannel {
    pub fn new(config: RealtimeConfig, store: Arc<NotificationStore>) -> Self {
        Self { config, store }
    }

    /// Start the ingest loop. Returns `None` when no endpoint is configured.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        let Some(url) = self.config.url.clone() else {
            tracing::info!("realtime: no endpoint configured, live delivery disabled");
            return None;
        };
        Some(tokio::spawn(async move { self.run(url).await }))
    }

    async fn run(self, url: Url) {
        let mut backoff = Backoff::new(
            self.config.reconnect_base,
            self.config.reconnect_max,
            self.config.jitter_ms,
        );
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match self.session(&url, &mut backoff).await {
                Ok(()) => tracing::info!(url = %url, "realtime: connection closed"),
                Err(e) => tracing::warn!(url = %url, attempt, error = %e, "realtime: connection failed"),
            }

            let delay = backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "realtime: reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection lifetime. Returns when the socket closes.
    async fn session(&self, url: &Url, backoff: &mut Backoff) -> anyhow::Result<()> {
        let (ws, _resp) = connect_async(url.as_str())
            .await
            .context("websocket connect failed")?;
        let (mut sink, mut stream) = ws.split();

        let cursor = self.store.cursor().await;
        let hello = Outbound::hello(cursor).to_json()?;
        sink.send(Message::Text(hello))
            .await
            .context("failed to send hello")?;
        backoff.reset();
        tracing::info!(url = %url, cursor, "realtime: connected");

        let mut received: u64 = 0;
        while let Some(msg) = stream.next().await {
            match msg.context("websocket read failed")? {
                Message::Text(text) => {
                    received += 1;
                    self.handle_text(&text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        tracing::debug!(received, "realtime: session ended");
        Ok(())
    }

    /// Handle one text frame. Returns whether a new record was stored.
    pub async fn handle_text(&self, raw: &str) -> bool {
        let Some(frame) = Inbound::parse(raw) else {
            return false;
        };
        match frame {
            Inbound::Notif(record) => {
                let id = record.id.clone();
                match self.store.accept(record).await {
                    Ok(InsertOutcome::Inserted) => true,
                    Ok(InsertOutcome::Duplicate) => {
                        tracing::trace!(id = %id, "realtime: duplicate notification");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, code = e.code(), "realtime: failed to store notification");
                        false
                    }
                }
            }
            Inbound::HelloAck => {
                tracing::debug!("realtime: hello acknowledged");
                false
            }
            Inbound::Other => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, EventBus};
    use crate::models::notification::NotificationRecord;
    use crate::store::{ObjectKv, StoreConfig};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;

    fn store() -> Arc<NotificationStore> {
        Arc::new(NotificationStore::new(
            Arc::new(ObjectKv::memory("test")),
            EventBus::new(),
            StoreConfig::default(),
        ))
    }

    fn config_for(addr: std::net::SocketAddr) -> RealtimeConfig {
        RealtimeConfig {
            url: Some(Url::parse(&format!("ws://{}/ws/global-notifications", addr)).unwrap()),
            reconnect_base: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(50),
            jitter_ms: 0,
        }
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }

    async fn read_hello(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
        let msg = ws.next().await.unwrap().unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    async fn wait_accepted(rx: &mut tokio::sync::broadcast::Receiver<BusEvent>) -> NotificationRecord {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(BusEvent::NotificationAccepted(record)) = rx.recv().await {
                    return record;
                }
            }
        })
        .await
        .expect("no notification accepted")
    }

    fn notif(id: &str, created_at: i64) -> Message {
        Message::Text(format!(
            r#"{{"t":"notif","id":"{}","type":"ANNOUNCEMENT","category":"announcement","title":"T","message":"M","createdAt":{}}}"#,
            id, created_at
        ))
    }

    #[tokio::test]
    async fn test_disabled_channel_is_noop() {
        let channel = IngestChannel::new(RealtimeConfig::default(), store());
        assert!(channel.spawn().is_none());
    }

    #[tokio::test]
    async fn test_handle_text_dedups_and_ignores_garbage() {
        let store = store();
        let channel = IngestChannel::new(RealtimeConfig::default(), store.clone());

        assert!(!channel.handle_text("{broken").await);
        assert!(!channel.handle_text(r#"{"t":"hello-ack"}"#).await);
        assert!(channel
            .handle_text(r#"{"t":"notif","id":"n1","createdAt":1000,"readAt":5}"#)
            .await);
        assert!(!channel
            .handle_text(r#"{"t":"notif","id":"n1","createdAt":1000}"#)
            .await);

        let all = store.load_all().await;
        assert_eq!(all.len(), 1);
        assert!(all[0].read_at.is_none());
        assert_eq!(store.cursor().await, 1000);
    }

    #[tokio::test]
    async fn test_hello_carries_cursor_and_frames_are_stored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let store = store();
        store.insert(NotificationRecord::new("old", 500)).await.unwrap();
        let mut rx = store.bus().subscribe();

        let handle = IngestChannel::new(config_for(listener.local_addr().unwrap()), store.clone())
            .spawn()
            .unwrap();
        let mut ws = accept(&listener).await;

        let hello = read_hello(&mut ws).await;
        assert_eq!(hello["t"], "hello");
        assert_eq!(hello["cursor"], 500);
        assert_eq!(hello["cap"], serde_json::json!(["toast", "center"]));

        ws.send(Message::Text(r#"{"t":"hello-ack"}"#.into())).await.unwrap();
        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(notif("n1", 1000)).await.unwrap();
        assert_eq!(wait_accepted(&mut rx).await.id, "n1");

        ws.send(notif("n1", 1000)).await.unwrap();
        ws.send(notif("n2", 900)).await.unwrap();
        assert_eq!(wait_accepted(&mut rx).await.id, "n2");

        assert_eq!(store.load_all().await.len(), 3);
        assert_eq!(store.cursor().await, 1000);
        handle.abort();
    }

    #[tokio::test]
    async fn test_reconnects_with_advanced_cursor() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let store = store();
        let mut rx = store.bus().subscribe();

        let handle = IngestChannel::new(config_for(listener.local_addr().unwrap()), store.clone())
            .spawn()
            .unwrap();

        let mut first = accept(&listener).await;
        assert_eq!(read_hello(&mut first).await["cursor"], 0);
        first.send(notif("n1", 2000)).await.unwrap();
        wait_accepted(&mut rx).await;
        first.close(None).await.unwrap();
        drop(first);

        let mut second = tokio::time::timeout(Duration::from_secs(5), accept(&listener))
            .await
            .expect("client did not reconnect");
        assert_eq!(read_hello(&mut second).await["cursor"], 2000);
        handle.abort();
    }
}
