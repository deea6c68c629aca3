use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::badge::UnreadMode;
use crate::models::notification::UnreadWindow;
use crate::realtime::RealtimeConfig;
use crate::store::StoreConfig;
use crate::toast::ToastConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the platform. Its origin scopes local storage.
    pub server_url: Url,
    pub realtime_enabled: bool,
    /// Path of the notification socket on the server.
    pub realtime_path: String,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_jitter_ms: u64,
    /// `file:///dir` or `memory://`.
    pub store_url: String,
    /// Max records kept locally. Set via EF_RETENTION. Default: 1000.
    pub retention: usize,
    pub unread_window: UnreadWindow,
    /// `global` reads the local count, `user` asks the server.
    pub mode: UnreadMode,
    /// Request timeout for the server-mode unread query.
    pub unread_timeout_ms: u64,
    /// At least 1. Set via EF_TOAST_MAX_VISIBLE. Default: 3.
    pub toast_max_visible: usize,
    pub toast_auto_dismiss_ms: u64,
    pub toast_rate_window_ms: u64,
    pub toast_rate_max: usize,
    pub reduced_motion: bool,
}

impl Config {
    /// `host[:port]` of the server, used to namespace local storage.
    pub fn origin(&self) -> String {
        let host = self.server_url.host_str().unwrap_or_default();
        match self.server_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Socket URL: same host as the server, `ws`/`wss` matching `http`/`https`.
    pub fn ws_url(&self) -> anyhow::Result<Url> {
        let mut url = self.server_url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("cannot derive websocket url from {}", self.server_url))?;
        url.set_path(&self.realtime_path);
        url.set_query(None);
        Ok(url)
    }

    pub fn realtime(&self) -> anyhow::Result<RealtimeConfig> {
        let url = if self.realtime_enabled {
            Some(self.ws_url()?)
        } else {
            None
        };
        Ok(RealtimeConfig {
            url,
            reconnect_base: Duration::from_millis(self.reconnect_base_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
            jitter_ms: self.reconnect_jitter_ms,
        })
    }

    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            retention: self.retention,
            unread_window: self.unread_window,
            ..StoreConfig::default()
        }
    }

    pub fn unread_timeout(&self) -> Duration {
        Duration::from_millis(self.unread_timeout_ms)
    }

    pub fn toast(&self) -> ToastConfig {
        ToastConfig {
            max_visible: self.toast_max_visible,
            auto_dismiss: Duration::from_millis(self.toast_auto_dismiss_ms),
            rate_window: Duration::from_millis(self.toast_rate_window_ms),
            rate_max: self.toast_rate_max,
            reduced_motion: self.reduced_motion,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup. `load` passes the process environment.
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let num = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    };
    let flag = |key: &str, default: bool| -> bool {
        match get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "1" || v == "true" || v == "yes" => true,
            Some(v) if v == "0" || v == "false" || v == "no" => false,
            _ => default,
        }
    };

    let raw_url = get("EF_SERVER_URL").unwrap_or_else(|| "http://localhost:8080".into());
    let server_url = Url::parse(&raw_url).with_context(|| format!("invalid EF_SERVER_URL: {}", raw_url))?;

    let unread_window = match get("EF_UNREAD_WINDOW") {
        Some(v) => v.parse().map_err(anyhow::Error::msg)?,
        None => UnreadWindow::All,
    };
    let mode = match get("EF_NOTIFICATIONS_MODE") {
        Some(v) => v.parse().map_err(anyhow::Error::msg)?,
        None => UnreadMode::Local,
    };

    Ok(Config {
        server_url,
        realtime_enabled: flag("EF_REALTIME_ENABLED", true),
        realtime_path: get("EF_REALTIME_PATH").unwrap_or_else(|| "/ws/global-notifications".into()),
        reconnect_base_ms: num("EF_RECONNECT_BASE_MS", 1000),
        reconnect_max_ms: num("EF_RECONNECT_MAX_MS", 30_000),
        reconnect_jitter_ms: num("EF_RECONNECT_JITTER_MS", 1000),
        store_url: get("EF_STORE_URL").unwrap_or_else(|| "file://.efnotify".into()),
        retention: num("EF_RETENTION", 1000) as usize,
        unread_window,
        mode,
        unread_timeout_ms: num("EF_UNREAD_TIMEOUT_MS", 10_000).max(1),
        toast_max_visible: num("EF_TOAST_MAX_VISIBLE", 3).max(1) as usize,
        toast_auto_dismiss_ms: num("EF_TOAST_AUTO_DISMISS_MS", 6000),
        toast_rate_window_ms: num("EF_TOAST_RATE_WINDOW_MS", 30_000),
        toast_rate_max: num("EF_TOAST_RATE_MAX", 6) as usize,
        reduced_motion: flag("EF_REDUCED_MOTION", false),
    })
}
