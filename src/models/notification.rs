use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};

/// Milliseconds in a day, used by the `last24h` filter.
pub const DAY_MS: i64 = 24 * 3600 * 1000;

/// Fallback link when a notification carries neither `targetUrl` nor `talkId`.
pub const CENTER_PATH: &str = "/notifications/center";

/// A notification as persisted in the local inbox.
///
/// Field names follow the wire format (`createdAt`, `talkId`, ...) so a
/// server push can be stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(default)]
    pub r#type: String, // 'type' is a reserved keyword
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// Epoch millis. Orders the inbox and drives the resume cursor.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<i64>,
}

impl NotificationRecord {
    pub fn new(id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            r#type: String::new(),
            category: Category::default(),
            title: String::new(),
            message: String::new(),
            created_at,
            talk_id: None,
            event_id: None,
            target_url: None,
            dedupe_key: None,
            expires_at: None,
            read_at: None,
            dismissed_at: None,
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed_at.is_some()
    }

    /// Active records are the only ones any view ever shows.
    pub fn is_active(&self) -> bool {
        !self.is_dismissed()
    }

    pub fn is_unread(&self) -> bool {
        self.is_active() && !self.is_read()
    }

    /// Deep link to the talk page, if the notification references one.
    pub fn talk_link(&self) -> Option<String> {
        self.talk_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| format!("/talks/{}", urlencoding::encode(t)))
    }

    /// Where "open" navigates from the center: explicit target, then the
    /// talk, then the center itself.
    pub fn open_url(&self) -> String {
        self.target_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| self.talk_link())
            .unwrap_or_else(|| CENTER_PATH.to_string())
    }

    /// Link shown on a toast. Breaks never link to a talk.
    pub fn toast_link(&self) -> Option<String> {
        if let Some(url) = self.target_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        if self.category == Category::Break {
            return None;
        }
        self.talk_link()
    }

    /// Title for display, falling back to the type tag.
    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.r#type.is_empty() {
            &self.r#type
        } else {
            self.category.label()
        }
    }
}

// ── Category ──────────────────────────────────────────────────

/// Coarse classification used for chips and toast links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Event,
    Talk,
    Break,
    #[default]
    Announcement,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Event => "event",
            Category::Talk => "talk",
            Category::Break => "break",
            Category::Announcement => "announcement",
        }
    }

    /// Human label for the chip.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Event => "Event",
            Category::Talk => "Talk",
            Category::Break => "Break",
            Category::Announcement => "Notice",
        }
    }

    pub fn chip_class(&self) -> String {
        format!("chip-{}", self.as_str())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Category::Event,
            "talk" => Category::Talk,
            "break" => Category::Break,
            _ => Category::Announcement,
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Filters ───────────────────────────────────────────────────

/// View filter over active records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Unread,
    Last24h,
    Today,
}

impl Filter {
    pub fn matches(&self, record: &NotificationRecord, now_ms: i64, offset: &FixedOffset) -> bool {
        match self {
            Filter::All => true,
            Filter::Unread => !record.is_read(),
            Filter::Last24h => now_ms - record.created_at <= DAY_MS,
            Filter::Today => same_local_day(record.created_at, now_ms, offset),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Unread => "unread",
            Filter::Last24h => "last24h",
            Filter::Today => "today",
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Filter::All),
            "unread" => Ok(Filter::Unread),
            "last24h" => Ok(Filter::Last24h),
            "today" => Ok(Filter::Today),
            other => Err(format!("unknown filter '{}'", other)),
        }
    }
}

/// Which active, unread records count toward the badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreadWindow {
    #[default]
    All,
    Today,
}

impl UnreadWindow {
    pub fn counts(&self, record: &NotificationRecord, now_ms: i64, offset: &FixedOffset) -> bool {
        if !record.is_unread() {
            return false;
        }
        match self {
            UnreadWindow::All => true,
            UnreadWindow::Today => same_local_day(record.created_at, now_ms, offset),
        }
    }
}

impl FromStr for UnreadWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(UnreadWindow::All),
            "today" => Ok(UnreadWindow::Today),
            other => Err(format!("unknown unread window '{}'", other)),
        }
    }
}

/// True when both timestamps fall on the same calendar day at `offset`.
pub fn same_local_day(a_ms: i64, b_ms: i64, offset: &FixedOffset) -> bool {
    let a = offset.timestamp_millis_opt(a_ms).single();
    let b = offset.timestamp_millis_opt(b_ms).single();
    match (a, b) {
        (Some(a), Some(b)) => a.date_naive() == b.date_naive(),
        _ => false,
    }
}

/// Current wall-clock time in epoch millis.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
