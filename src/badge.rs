//! Unread badge.
//!
//! `UnreadAdapter` answers "how many unread?" from one of two sources:
//!   - `Local`: the derived count the store maintains on every write.
//!   - `Server`: `GET /api/notifications?filter=unread&limit=1`, reading
//!     `unreadCount` from the body. Non-2xx responses are errors.
//!
//! `Badge` is the display side: it refreshes from the adapter, falls back to
//! zero on error, and publishes a `BadgeView` on a `watch` channel.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CACHE_CONTROL;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use crate::errors::{NotifyError, Result};
use crate::store::NotificationStore;

const UNREAD_ENDPOINT: &str = "/api/notifications";
pub const DEFAULT_UNREAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreadMode {
    #[default]
    Local,
    Server,
}

impl FromStr for UnreadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "local" => Ok(UnreadMode::Local),
            "user" | "server" => Ok(UnreadMode::Server),
            other => Err(format!("unknown notifications mode '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadResponse {
    #[serde(default)]
    unread_count: Option<u64>,
}

pub struct UnreadAdapter {
    mode: UnreadMode,
    store: Arc<NotificationStore>,
    http: reqwest::Client,
    server_url: Url,
}

impl UnreadAdapter {
    /// `timeout` bounds the whole server-mode request, so a hung endpoint
    /// surfaces as an error instead of stalling the badge.
    pub fn new(
        mode: UnreadMode,
        store: Arc<NotificationStore>,
        server_url: Url,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("efnotify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            mode,
            store,
            http,
            server_url,
        })
    }

    pub fn mode(&self) -> UnreadMode {
        self.mode
    }

    /// Current unread count. Server-mode failures propagate.
    pub async fn unread_count(&self) -> Result<u64> {
        match self.mode {
            UnreadMode::Local => Ok(self.store.cached_unread_count().await),
            UnreadMode::Server => self.fetch_unread().await,
        }
    }

    async fn fetch_unread(&self) -> Result<u64> {
        let url = self
            .server_url
            .join(UNREAD_ENDPOINT)
            .map_err(|e| NotifyError::InvalidConfig(format!("bad server url: {}", e)))?;

        let resp = self
            .http
            .get(url)
            .query(&[("filter", "unread"), ("limit", "1")])
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::UnreadFetch {
                status: status.as_u16(),
            });
        }

        let body: UnreadResponse = resp.json().await?;
        Ok(body.unread_count.unwrap_or(0))
    }
}

// ── Badge view ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeView {
    pub count: u64,
    pub hidden: bool,
    /// Screen-reader text. Empty when there is nothing to announce.
    pub announcement: String,
}

impl BadgeView {
    pub fn from_count(count: u64) -> Self {
        let announcement = match count {
            0 => String::new(),
            1 => "1 new notification".to_string(),
            n => format!("{} new notifications", n),
        };
        Self {
            count,
            hidden: count == 0,
            announcement,
        }
    }
}

pub struct Badge {
    adapter: UnreadAdapter,
    tx: watch::Sender<BadgeView>,
}

impl Badge {
    pub fn new(adapter: UnreadAdapter) -> Self {
        let (tx, _) = watch::channel(BadgeView::from_count(0));
        Self { adapter, tx }
    }

    /// Recompute and publish. Errors display as zero.
    pub async fn refresh(&self) -> BadgeView {
        let count = match self.adapter.unread_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "badge: unread count unavailable, showing 0");
                0
            }
        };
        let view = BadgeView::from_count(count);
        self.tx.send_replace(view.clone());
        view
    }

    pub fn current(&self) -> BadgeView {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BadgeView> {
        self.tx.subscribe()
    }
}
