//! Notification Center: full-history inbox view with filters, per-row
//! actions, multi-select and bulk actions.
//!
//! Headless: `render` produces a `CenterView` that an outer UI draws. The
//! rendered rows double as the checkbox state, so bulk actions always act on
//! what is actually checked on screen rather than on a shadow set that may
//! have drifted.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::TimeZone;
use serde::Serialize;

use crate::bus::BusEvent;
use crate::errors::Result;
use crate::models::notification::{Filter, NotificationRecord};
use crate::store::{Mutation, NotificationStore};

pub const MARK_READ_LABEL: &str = "Mark read";
pub const MARK_UNREAD_LABEL: &str = "Mark unread";
pub const SELECT_ALL_LABEL: &str = "Select all";
pub const DESELECT_ALL_LABEL: &str = "Deselect all";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CenterRow {
    pub id: String,
    pub title: String,
    pub message: String,
    pub created_label: String,
    pub chip_label: &'static str,
    pub chip_class: String,
    pub unread: bool,
    pub read_label: &'static str,
    pub open_url: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CenterView {
    pub filter: &'static str,
    pub rows: Vec<CenterRow>,
    /// Show the empty-state indicator.
    pub empty: bool,
    pub select_all_label: &'static str,
    /// The delete-all confirmation dialog is open.
    pub confirm_open: bool,
}

impl CenterView {
    fn all_checked(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.checked)
    }

    fn refresh_select_all_label(&mut self) {
        self.select_all_label = if self.all_checked() {
            DESELECT_ALL_LABEL
        } else {
            SELECT_ALL_LABEL
        };
    }
}

pub struct NotificationCenter {
    store: Arc<NotificationStore>,
    filter: Filter,
    /// Selection carried across re-renders.
    selected: HashSet<String>,
    view: CenterView,
}

impl NotificationCenter {
    /// Build the center and render it once under the `all` filter.
    pub async fn open(store: Arc<NotificationStore>) -> Self {
        let mut center = Self {
            store,
            filter: Filter::All,
            selected: HashSet::new(),
            view: CenterView {
                filter: Filter::All.as_str(),
                rows: Vec::new(),
                empty: true,
                select_all_label: SELECT_ALL_LABEL,
                confirm_open: false,
            },
        };
        center.render().await;
        center
    }

    pub fn view(&self) -> &CenterView {
        &self.view
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Re-read the store and rebuild the rows under the current filter.
    pub async fn render(&mut self) -> &CenterView {
        let records = self.store.query_active(self.filter).await;
        let rows: Vec<CenterRow> = records.iter().map(|r| self.row_for(r)).collect();

        self.view.filter = self.filter.as_str();
        self.view.empty = rows.is_empty();
        self.view.rows = rows;
        self.view.refresh_select_all_label();
        tracing::debug!(filter = self.filter.as_str(), rows = self.view.rows.len(), "center: rendered");
        &self.view
    }

    /// Keep an open center current: a newly accepted record triggers a
    /// re-render. Returns whether the view was rebuilt.
    pub async fn apply_event(&mut self, event: &BusEvent) -> bool {
        match event {
            BusEvent::NotificationAccepted(_) => {
                self.render().await;
                true
            }
            BusEvent::StoreChanged { .. } => false,
        }
    }

    pub async fn set_filter(&mut self, filter: Filter) -> &CenterView {
        self.filter = filter;
        self.render().await
    }

    /// Checkbox change on one row. Returns `false` when the row is not rendered.
    pub fn set_checked(&mut self, id: &str, checked: bool) -> bool {
        let Some(row) = self.view.rows.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        row.checked = checked;
        if checked {
            self.selected.insert(id.to_string());
        } else {
            self.selected.remove(id);
        }
        self.view.refresh_select_all_label();
        true
    }

    /// Check every rendered row, or uncheck them all when all are checked.
    pub fn toggle_select_all(&mut self) -> &CenterView {
        let check = !self.view.all_checked();
        for row in self.view.rows.iter_mut() {
            row.checked = check;
            if check {
                self.selected.insert(row.id.clone());
            } else {
                self.selected.remove(&row.id);
            }
        }
        self.view.refresh_select_all_label();
        &self.view
    }

    /// Flip read state of one record.
    pub async fn toggle_read(&mut self, id: &str) -> Result<bool> {
        let changed = self.store.update(id, Mutation::ToggleRead).await?;
        if changed {
            self.render().await;
        }
        Ok(changed)
    }

    /// Navigation target for a rendered row. Does not touch the store.
    pub fn open_url(&self, id: &str) -> Option<&str> {
        self.view
            .rows
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.open_url.as_str())
    }

    pub async fn mark_all_read(&mut self) -> Result<usize> {
        let changed = self.store.mark_all_read().await?;
        self.render().await;
        Ok(changed)
    }

    /// Dismiss every checked row. Nothing happens when no row is checked.
    pub async fn delete_selected(&mut self) -> Result<usize> {
        let checked: Vec<String> = self
            .view
            .rows
            .iter()
            .filter(|r| r.checked)
            .map(|r| r.id.clone())
            .collect();
        if checked.is_empty() {
            return Ok(0);
        }

        let changed = self.store.update_many(&checked, Mutation::Dismiss).await?;
        self.selected.clear();
        self.render().await;
        tracing::info!(dismissed = changed, "center: selection deleted");
        Ok(changed)
    }

    /// Open the delete-all confirmation.
    pub fn request_delete_all(&mut self) {
        self.view.confirm_open = true;
    }

    pub fn cancel_delete_all(&mut self) {
        self.view.confirm_open = false;
    }

    /// Dismiss every active record. Only acts while the confirmation is open.
    pub async fn confirm_delete_all(&mut self) -> Result<usize> {
        if !self.view.confirm_open {
            return Ok(0);
        }
        let changed = self.store.dismiss_all().await?;
        self.selected.clear();
        self.view.confirm_open = false;
        self.render().await;
        tracing::info!(dismissed = changed, "center: all notifications deleted");
        Ok(changed)
    }

    fn row_for(&self, record: &NotificationRecord) -> CenterRow {
        let unread = !record.is_read();
        CenterRow {
            id: record.id.clone(),
            title: record.display_title().to_string(),
            message: record.message.clone(),
            created_label: self.format_timestamp(record.created_at),
            chip_label: record.category.label(),
            chip_class: record.category.chip_class(),
            unread,
            read_label: if unread { MARK_READ_LABEL } else { MARK_UNREAD_LABEL },
            open_url: record.open_url(),
            checked: self.selected.contains(&record.id),
        }
    }

    fn format_timestamp(&self, ms: i64) -> String {
        self.store
            .config()
            .offset
            .timestamp_millis_opt(ms)
            .single()
            .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default()
    }
}
