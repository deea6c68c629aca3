//! Live notification delivery over WebSocket.

pub mod backoff;
pub mod channel;
pub mod protocol;

pub use channel::{IngestChannel, RealtimeConfig};
