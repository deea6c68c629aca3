//! Local notification inbox.
//!
//! Three durable keys, scoped per origin by the `KvBackend`:
//!   - `ef_global_notifs`: JSON array of `NotificationRecord`, insertion order,
//!     capped to the retention limit (oldest dropped first).
//!   - `ef_global_lastCursor`: max `createdAt` ever inserted. Never regresses.
//!   - `ef_global_unread_count`: derived unread count, rewritten on every write.
//!
//! Every mutation is a whole-collection read → mutate → write under one async
//! lock, operating on a freshly loaded snapshot. Every write broadcasts
//! `BusEvent::StoreChanged` with the recomputed unread count.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{FixedOffset, Offset};
use tokio::sync::Mutex;

use crate::bus::{BusEvent, EventBus};
use crate::errors::Result;
use crate::models::notification::{now_ms, Filter, NotificationRecord, UnreadWindow};

use super::kv::KvBackend;

pub const NOTIFS_KEY: &str = "ef_global_notifs";
pub const CURSOR_KEY: &str = "ef_global_lastCursor";
pub const UNREAD_KEY: &str = "ef_global_unread_count";

/// Default retention cap.
pub const DEFAULT_RETENTION: usize = 1000;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Max records kept. Oldest (by insertion) are dropped beyond this.
    pub retention: usize,
    /// Which unread records count toward the badge.
    pub unread_window: UnreadWindow,
    /// Offset used for "same calendar day" checks.
    pub offset: FixedOffset,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            unread_window: UnreadWindow::All,
            offset: chrono::Local::now().offset().fix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// The closed set of per-record state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    MarkRead,
    MarkUnread,
    ToggleRead,
    Dismiss,
}

impl Mutation {
    /// Apply to `record`. Returns whether anything changed.
    /// Dismissed records are inert, including to a second dismiss.
    fn apply(&self, record: &mut NotificationRecord, now: i64) -> bool {
        if record.is_dismissed() {
            return false;
        }
        match self {
            Mutation::MarkRead => {
                if record.is_read() {
                    return false;
                }
                record.read_at = Some(now);
            }
            Mutation::MarkUnread => {
                if !record.is_read() {
                    return false;
                }
                record.read_at = None;
            }
            Mutation::ToggleRead => {
                record.read_at = match record.read_at {
                    Some(_) => None,
                    None => Some(now),
                };
            }
            Mutation::Dismiss => {
                record.dismissed_at = Some(now);
            }
        }
        true
    }
}

pub struct NotificationStore {
    kv: Arc<dyn KvBackend>,
    write_lock: Mutex<()>,
    bus: EventBus,
    config: StoreConfig,
}

impl NotificationStore {
    pub fn new(kv: Arc<dyn KvBackend>, bus: EventBus, config: StoreConfig) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
            bus,
            config,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fresh snapshot of every stored record, dismissed included.
    /// Unreadable or corrupt data reads as an empty inbox.
    pub async fn load_all(&self) -> Vec<NotificationRecord> {
        let raw = match self.kv.get(NOTIFS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "local store: read failed, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "local store: corrupt inbox, treating as empty");
                Vec::new()
            }
        }
    }

    /// Insert a record unless one with the same id is already stored.
    pub async fn insert(&self, record: NotificationRecord) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_all().await;
        if records.iter().any(|r| r.id == record.id) {
            tracing::debug!(id = %record.id, "local store: duplicate id, skipping");
            return Ok(InsertOutcome::Duplicate);
        }

        let created_at = record.created_at;
        records.push(record);
        let retention = self.config.retention.max(1);
        if records.len() > retention {
            let excess = records.len() - retention;
            records.drain(..excess);
            tracing::debug!(evicted = excess, "local store: retention trim");
        }

        self.save_all(&records).await?;
        self.advance_cursor(created_at).await?;
        Ok(InsertOutcome::Inserted)
    }

    /// Entry point for newly received notifications: insert, and on success
    /// announce the record as `NotificationAccepted`. Wire-supplied read or
    /// dismiss state is discarded.
    pub async fn accept(&self, mut record: NotificationRecord) -> Result<InsertOutcome> {
        record.read_at = None;
        record.dismissed_at = None;

        let outcome = self.insert(record.clone()).await?;
        if outcome == InsertOutcome::Inserted {
            tracing::debug!(id = %record.id, created_at = record.created_at, "local store: notification accepted");
            self.bus.publish(BusEvent::NotificationAccepted(record));
        }
        Ok(outcome)
    }

    /// Apply `mutation` to one record. Returns `false` when the record is
    /// missing, already dismissed, or already in the requested state.
    pub async fn update(&self, id: &str, mutation: Mutation) -> Result<bool> {
        let changed = self.update_many(&[id.to_string()], mutation).await?;
        Ok(changed > 0)
    }

    /// Apply `mutation` to every listed record in a single write.
    pub async fn update_many(&self, ids: &[String], mutation: Mutation) -> Result<usize> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.mutate_where(|r| ids.contains(r.id.as_str()), mutation).await
    }

    /// Mark every active unread record as read.
    pub async fn mark_all_read(&self) -> Result<usize> {
        self.mutate_where(|r| r.is_unread(), Mutation::MarkRead).await
    }

    /// Dismiss every active record.
    pub async fn dismiss_all(&self) -> Result<usize> {
        self.mutate_where(|r| r.is_active(), Mutation::Dismiss).await
    }

    async fn mutate_where<P>(&self, predicate: P, mutation: Mutation) -> Result<usize>
    where
        P: Fn(&NotificationRecord) -> bool,
    {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_all().await;
        let now = now_ms();
        let mut changed = 0;
        for record in records.iter_mut() {
            if predicate(&*record) && mutation.apply(record, now) {
                changed += 1;
            }
        }

        if changed > 0 {
            self.save_all(&records).await?;
            tracing::debug!(changed, ?mutation, "local store: records updated");
        }
        Ok(changed)
    }

    /// Active records matching `filter`, newest first.
    pub async fn query_active(&self, filter: Filter) -> Vec<NotificationRecord> {
        self.query_active_at(filter, now_ms()).await
    }

    pub async fn query_active_at(&self, filter: Filter, now: i64) -> Vec<NotificationRecord> {
        let mut items: Vec<NotificationRecord> = self
            .load_all()
            .await
            .into_iter()
            .filter(|r| r.is_active() && filter.matches(r, now, &self.config.offset))
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }

    /// Unread count computed from the records under the configured window.
    pub async fn unread_count(&self) -> u64 {
        let records = self.load_all().await;
        self.count_unread(&records, now_ms())
    }

    /// The persisted derived count, as maintained by the last write.
    pub async fn cached_unread_count(&self) -> u64 {
        match self.kv.get(UNREAD_KEY).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "local store: unread count unreadable");
                0
            }
        }
    }

    /// Rewrite the derived count without touching records. A `today` window
    /// drifts at midnight, so callers refresh it at startup.
    pub async fn recompute_unread(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let records = self.load_all().await;
        self.publish_unread(&records).await
    }

    /// Resume cursor: max `createdAt` ever inserted, 0 when unknown.
    pub async fn cursor(&self) -> i64 {
        match self.kv.get(CURSOR_KEY).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "local store: cursor unreadable");
                0
            }
        }
    }

    async fn advance_cursor(&self, created_at: i64) -> Result<()> {
        if created_at > self.cursor().await {
            self.kv.put(CURSOR_KEY, created_at.to_string()).await?;
            tracing::debug!(cursor = created_at, "local store: cursor advanced");
        }
        Ok(())
    }

    async fn save_all(&self, records: &[NotificationRecord]) -> Result<u64> {
        let json = serde_json::to_string(records)?;
        self.kv.put(NOTIFS_KEY, json).await?;
        self.publish_unread(records).await
    }

    async fn publish_unread(&self, records: &[NotificationRecord]) -> Result<u64> {
        let unread = self.count_unread(records, now_ms());
        self.kv.put(UNREAD_KEY, unread.to_string()).await?;
        self.bus.publish(BusEvent::StoreChanged {
            unread_count: unread,
        });
        Ok(unread)
    }

    fn count_unread(&self, records: &[NotificationRecord], now: i64) -> u64 {
        records
            .iter()
            .filter(|r| self.config.unread_window.counts(r, now, &self.config.offset))
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::DAY_MS;
    use crate::store::kv::ObjectKv;

    fn store_with(config: StoreConfig) -> NotificationStore {
        NotificationStore::new(Arc::new(ObjectKv::memory("test")), EventBus::new(), config)
    }

    fn store() -> NotificationStore {
        store_with(StoreConfig::default())
    }

    fn rec(id: &str, created_at: i64) -> NotificationRecord {
        let mut r = NotificationRecord::new(id, created_at);
        r.title = format!("title {}", id);
        r
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_by_id() {
        let store = store();
        assert_eq!(store.insert(rec("a", 1)).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(rec("a", 1)).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.load_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_publishes_only_new_records() {
        let store = store();
        let mut rx = store.bus().subscribe();
        let mut incoming = rec("a", 10);
        incoming.read_at = Some(5);

        assert_eq!(store.accept(incoming.clone()).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.accept(incoming).await.unwrap(), InsertOutcome::Duplicate);

        let mut accepted = 0;
        while let Ok(event) = rx.try_recv() {
            if let BusEvent::NotificationAccepted(r) = event {
                assert!(r.read_at.is_none());
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert!(store.load_all().await[0].read_at.is_none());
    }

    #[tokio::test]
    async fn test_cursor_tracks_max_created_at() {
        let store = store();
        for (i, ts) in [500, 2000, 100, 1500, 3000, 2500].iter().enumerate() {
            store.insert(rec(&format!("n{}", i), *ts)).await.unwrap();
        }
        assert_eq!(store.cursor().await, 3000);
    }

    #[tokio::test]
    async fn test_retention_drops_oldest_inserted() {
        let store = store();
        for i in 0..=DEFAULT_RETENTION {
            store.insert(rec(&format!("n{}", i), i as i64)).await.unwrap();
        }
        let all = store.load_all().await;
        assert_eq!(all.len(), DEFAULT_RETENTION);
        assert!(all.iter().all(|r| r.id != "n0"));
        assert_eq!(all.last().unwrap().id, format!("n{}", DEFAULT_RETENTION));
    }

    #[tokio::test]
    async fn test_retention_is_by_insertion_order_not_created_at() {
        let store = store_with(StoreConfig { retention: 2, ..StoreConfig::default() });
        store.insert(rec("late", 9000)).await.unwrap();
        store.insert(rec("early", 10)).await.unwrap();
        store.insert(rec("mid", 500)).await.unwrap();
        let ids: Vec<String> = store.load_all().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["early", "mid"]);
    }

    #[tokio::test]
    async fn test_toggle_round_trip_restores_unread_count() {
        let store = store();
        store.insert(rec("a", now_ms())).await.unwrap();
        store.insert(rec("b", now_ms())).await.unwrap();
        assert_eq!(store.cached_unread_count().await, 2);

        assert!(store.update("a", Mutation::ToggleRead).await.unwrap());
        assert_eq!(store.cached_unread_count().await, 1);
        assert!(store.update("a", Mutation::ToggleRead).await.unwrap());
        assert_eq!(store.cached_unread_count().await, 2);
    }

    #[tokio::test]
    async fn test_dismiss_is_terminal() {
        let store = store();
        store.insert(rec("a", now_ms())).await.unwrap();
        assert!(store.update("a", Mutation::Dismiss).await.unwrap());

        assert!(!store.update("a", Mutation::ToggleRead).await.unwrap());
        assert!(!store.update("a", Mutation::MarkRead).await.unwrap());
        assert!(!store.update("a", Mutation::Dismiss).await.unwrap());

        let stored = &store.load_all().await[0];
        assert!(stored.read_at.is_none());
        for filter in [Filter::All, Filter::Unread, Filter::Last24h, Filter::Today] {
            assert!(store.query_active(filter).await.is_empty());
        }
        assert_eq!(store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_missing_id_is_noop() {
        let store = store();
        assert!(!store.update("ghost", Mutation::MarkRead).await.unwrap());
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_query_sorted_newest_first() {
        let store = store();
        let now = now_ms();
        store.insert(rec("mid", now - 2000)).await.unwrap();
        store.insert(rec("new", now - 1000)).await.unwrap();
        store.insert(rec("old", now - 3000)).await.unwrap();
        let ids: Vec<String> = store
            .query_active(Filter::All)
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_last24h_filter_excludes_old_records() {
        let store = store();
        let now = now_ms();
        store.insert(rec("recent", now - 1000)).await.unwrap();
        store.insert(rec("stale", now - 2 * DAY_MS)).await.unwrap();
        let items = store.query_active_at(Filter::Last24h, now).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "recent");
    }

    #[tokio::test]
    async fn test_today_unread_window() {
        let store = store_with(StoreConfig {
            unread_window: UnreadWindow::Today,
            ..StoreConfig::default()
        });
        let now = now_ms();
        store.insert(rec("today", now)).await.unwrap();
        store.insert(rec("last-week", now - 7 * DAY_MS)).await.unwrap();
        assert_eq!(store.unread_count().await, 1);
        assert_eq!(store.cached_unread_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_and_dismiss_all() {
        let store = store();
        let now = now_ms();
        for id in ["a", "b", "c"] {
            store.insert(rec(id, now)).await.unwrap();
        }
        store.update("c", Mutation::Dismiss).await.unwrap();

        assert_eq!(store.mark_all_read().await.unwrap(), 2);
        assert_eq!(store.cached_unread_count().await, 0);
        assert!(store.load_all().await.iter().find(|r| r.id == "c").unwrap().read_at.is_none());

        assert_eq!(store.dismiss_all().await.unwrap(), 2);
        assert!(store.query_active(Filter::All).await.is_empty());
        // Dismissed records stay in storage until trimmed.
        assert_eq!(store.load_all().await.len(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_inbox_reads_as_empty() {
        let kv = Arc::new(ObjectKv::memory("test"));
        kv.put(NOTIFS_KEY, "{not json".into()).await.unwrap();
        let store = NotificationStore::new(kv, EventBus::new(), StoreConfig::default());
        assert!(store.load_all().await.is_empty());
        assert_eq!(store.insert(rec("a", 1)).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.load_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_every_write_broadcasts_unread() {
        let store = store();
        let mut rx = store.bus().subscribe();
        store.insert(rec("a", now_ms())).await.unwrap();
        store.update("a", Mutation::MarkRead).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), BusEvent::StoreChanged { unread_count: 1 });
        assert_eq!(rx.recv().await.unwrap(), BusEvent::StoreChanged { unread_count: 0 });
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_clobber() {
        let store = Arc::new(store());
        let now = now_ms();
        let mut handles = Vec::new();
        for i in 0..20 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.insert(rec(&format!("n{}", i), now + i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.load_all().await.len(), 20);
        assert_eq!(store.cursor().await, now + 19);
    }
}
