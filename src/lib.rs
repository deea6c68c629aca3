//! efnotify: client-side notification pipeline.
//!
//! Realtime ingest over WebSocket, a durable local inbox with cursor resume,
//! a rate-limited toast queue, a headless Notification Center and an unread
//! badge. `NotifyClient` wires the pieces together.

pub mod badge;
pub mod bus;
pub mod center;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod realtime;
pub mod store;
pub mod toast;

pub use client::{ClientHandle, NotifyClient};
pub use errors::{NotifyError, Result};
