//! Wire format of the global notification socket.
//!
//! Every frame is a JSON text message discriminated by `t`:
//!   - client → server: `{"t":"hello","cursor":<ms>,"cap":["toast","center"]}`
//!   - server → client: `{"t":"notif", ...NotificationRecord fields}`
//!   - server → client: `{"t":"hello-ack"}` (informational)
//!
//! Unknown `t` values are tolerated so the server can add frame types.

use serde::{Deserialize, Serialize};

use crate::models::notification::NotificationRecord;

/// Surfaces this client can present.
pub const CAPABILITIES: [&str; 2] = ["toast", "center"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum Outbound {
    Hello { cursor: i64, cap: Vec<String> },
}

impl Outbound {
    /// Handshake frame resuming from `cursor`.
    pub fn hello(cursor: i64) -> Self {
        Outbound::Hello {
            cursor,
            cap: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum Inbound {
    Notif(NotificationRecord),
    HelloAck,
    #[serde(other)]
    Other,
}

impl Inbound {
    /// Parse one text frame. Malformed JSON, a `notif` without an `id`, or
    /// a `notif` with an empty `id` yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Inbound>(raw) {
            Ok(Inbound::Notif(record)) if record.id.trim().is_empty() => None,
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::debug!(error = %e, "realtime: malformed frame ignored");
                None
            }
        }
    }
}
