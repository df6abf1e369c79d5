use std::fmt;
use std::sync::Arc;

use chrono::Datelike;

use crate::dates;
use crate::feed::{self, FeedSource};
use crate::limits::*;
use crate::model::*;
use crate::status;
use crate::store::{RoomStore, StoreError, SyncHistory};

#[derive(Debug)]
pub enum EngineError {
    NotFound(String),
    NoFields,
    InvalidField(&'static str),
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotFound(number) => write!(f, "room not found: {number}"),
            EngineError::NoFields => write!(f, "no fields to update"),
            EngineError::InvalidField(field) => write!(f, "invalid value for {field}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(number) => EngineError::NotFound(number),
            other => EngineError::Store(other),
        }
    }
}

/// Room records built from one feed grid.
#[derive(Debug, Default)]
pub struct Candidates {
    pub rooms: Vec<RoomRecord>,
    /// Malformed or duplicate rows. Blank room numbers are not counted.
    pub skipped: usize,
}

/// Result of a field-level update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub room: RoomRecord,
    pub old_status: RoomStatus,
    pub new_status: RoomStatus,
}

impl UpdateOutcome {
    pub fn status_changed(&self) -> bool {
        self.old_status != self.new_status
    }
}

/// Merges the feed into the store and applies field-level edits. Roles and
/// the transition policy are left to the caller.
pub struct Reconciler<S> {
    store: Arc<S>,
    year: Option<i32>,
}

impl<S: RoomStore + SyncHistory> Reconciler<S> {
    /// Dates without a year are resolved against the local calendar year.
    pub fn new(store: Arc<S>) -> Self {
        Self { store, year: None }
    }

    /// Pin the processing year.
    pub fn with_year(store: Arc<S>, year: i32) -> Self {
        Self {
            store,
            year: Some(year),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn current_year(&self) -> i32 {
        self.year.unwrap_or_else(|| chrono::Local::now().year())
    }

    /// Turn a feed grid into candidate records. Row 0 is the header.
    pub fn build_candidates(&self, rows: &[Vec<String>], at: Ms) -> Candidates {
        let year = self.current_year();
        let mut out = Candidates::default();
        let mut seen = std::collections::HashSet::new();

        for (index, row) in rows.iter().enumerate().skip(1) {
            let parsed = match feed::parse_row(row) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(row = index + 1, error = %e, "skipping feed row");
                    out.skipped += 1;
                    continue;
                }
            };
            if !seen.insert(parsed.number.clone()) {
                tracing::warn!(row = index + 1, room = %parsed.number, "duplicate room in feed, keeping first");
                out.skipped += 1;
                continue;
            }

            out.rooms.push(RoomRecord {
                status: status::normalize_status(&parsed.status, &parsed.arrival),
                current: dates::resolve_guest(&parsed.current, year),
                next: dates::resolve_guest(&parsed.next, year),
                room_type: parsed.room_type,
                updated_at: at,
                number: parsed.number,
            });
        }
        out
    }

    /// Replace every room with the feed's view and record the outcome.
    ///
    /// Never fails: problems end up in the returned (and recorded) outcome.
    /// When the store write fails the previous rooms are left in place.
    pub async fn reconcile_full(&self, rows: &[Vec<String>], actor: &str) -> SyncOutcome {
        let at = now_ms();
        let outcome = if rows.len() > MAX_FEED_ROWS {
            SyncOutcome::failed(actor, at, 0, format!("feed has more than {MAX_FEED_ROWS} rows"))
        } else {
            let candidates = self.build_candidates(rows, at);
            let (count, skipped) = (candidates.rooms.len(), candidates.skipped);
            if count == 0 {
                SyncOutcome::failed(actor, at, skipped, "feed contained no rooms")
            } else {
                match self.store.replace_all(candidates.rooms).await {
                    Ok(()) => SyncOutcome::succeeded(actor, at, count, skipped),
                    Err(e) => SyncOutcome::failed(actor, at, skipped, e.to_string()),
                }
            }
        };
        self.finish(outcome).await
    }

    /// Fetch, then reconcile. A failed fetch is recorded and the store is not
    /// touched.
    pub async fn resync(&self, source: &dyn FeedSource, actor: &str) -> SyncOutcome {
        match source.fetch().await {
            Ok(rows) => self.reconcile_full(&rows, actor).await,
            Err(e) => {
                let outcome = SyncOutcome::failed(actor, now_ms(), 0, e.to_string());
                self.finish(outcome).await
            }
        }
    }

    async fn finish(&self, outcome: SyncOutcome) -> SyncOutcome {
        let label = if outcome.success { "success" } else { "failure" };
        metrics::counter!(crate::observability::SYNCS_TOTAL, "status" => label).increment(1);
        if outcome.success {
            tracing::info!(
                actor = %outcome.actor,
                rooms = outcome.rows,
                skipped = outcome.skipped,
                "resync complete"
            );
        } else {
            tracing::warn!(
                actor = %outcome.actor,
                error = outcome.error.as_deref().unwrap_or(""),
                "resync failed"
            );
        }
        if let Err(e) = self.store.record(outcome.clone()).await {
            tracing::error!(error = %e, "could not record sync outcome");
        }
        outcome
    }

    /// Resolve raw change strings into a store patch.
    pub fn resolve_changes(&self, changes: &RoomChanges) -> Result<RoomPatch, EngineError> {
        if changes.is_empty() {
            return Err(EngineError::NoFields);
        }
        let year = self.current_year();

        let status = match &changes.status {
            Some(raw) if raw.trim().is_empty() => return Err(EngineError::InvalidField("status")),
            Some(raw) => Some(RoomStatus::parse(raw)),
            None => None,
        };
        for guest in [&changes.current, &changes.next].into_iter().flatten() {
            if guest.name.chars().count() > MAX_TEXT_LEN {
                return Err(EngineError::LimitExceeded("guest name too long"));
            }
        }
        let room_type = match &changes.room_type {
            Some(t) if t.chars().count() > MAX_TEXT_LEN => {
                return Err(EngineError::LimitExceeded("room type too long"));
            }
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };

        Ok(RoomPatch {
            status,
            current: changes.current.as_ref().map(|g| dates::resolve_guest(g, year)),
            next: changes.next.as_ref().map(|g| dates::resolve_guest(g, year)),
            room_type,
        })
    }

    /// Apply the present fields of `changes` to one room.
    pub async fn apply_update(
        &self,
        number: &str,
        changes: &RoomChanges,
        actor: &str,
    ) -> Result<UpdateOutcome, EngineError> {
        let patch = self.resolve_changes(changes)?;
        self.apply_patch(number, patch, actor, None).await
    }

    /// Apply an already-resolved patch. `expected` is the status the caller
    /// decided on; the write is refused if the room moved since.
    pub async fn apply_patch(
        &self,
        number: &str,
        patch: RoomPatch,
        actor: &str,
        expected: Option<&RoomStatus>,
    ) -> Result<UpdateOutcome, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::NoFields);
        }
        let RoomUpdate { before, after } = self
            .store
            .update_fields(number, patch, now_ms(), expected)
            .await?;
        tracing::debug!(room = number, actor, from = %before.status, to = %after.status, "room updated");
        Ok(UpdateOutcome {
            old_status: before.status,
            new_status: after.status.clone(),
            room: after,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::feed::{FeedError, StaticFeed};
    use crate::store::Store;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomsync_test_reconcile");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn reconciler(name: &str) -> Reconciler<Store> {
        let store = Arc::new(Store::new(test_wal_path(name)).unwrap());
        Reconciler::with_year(store, 2026)
    }

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    const HEADER: &[&str] = &["Room", "Status", "Arr", "Guest", "In", "Out", "Pax"];

    fn ten_rooms() -> Vec<Vec<String>> {
        let mut rows = vec![HEADER.iter().map(|c| c.to_string()).collect::<Vec<_>>()];
        for i in 1..=10 {
            rows.push(vec![format!("1{i:02}"), "VC".into()]);
        }
        rows
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn rooms_without_timestamps(store: &Store) -> Vec<RoomRecord> {
        store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|mut r| {
                r.updated_at = 0;
                r
            })
            .collect()
    }

    #[tokio::test]
    async fn full_resync_builds_rooms() {
        let rec = reconciler("full_resync.wal");
        let rows = grid(&[
            HEADER,
            &["101", "VD", "", "", "", "", ""],
            &["205", "VD", "ARR", "", "", "", "", "Tran", "28-12", "03-01", "2", "DLX"],
            &["310", "OD", "ARR", "Le", "30-12", "02-01", "1"],
        ]);

        let outcome = rec.reconcile_full(&rows, "Lan (FO)").await;
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.rows, 3);
        assert_eq!(outcome.skipped, 0);

        let store = rec.store();
        let r205 = store.get_by_number("205").await.unwrap().unwrap();
        assert_eq!(r205.status.to_string(), "vd/arr");
        assert_eq!(r205.room_type, "DLX");
        assert_eq!(r205.next.check_in, Some(ymd(2025, 12, 28)));
        assert_eq!(r205.next.check_out, Some(ymd(2026, 1, 3)));
        assert_eq!(r205.next.pax, 2);

        let r310 = store.get_by_number("310").await.unwrap().unwrap();
        assert_eq!(r310.status.to_string(), "od");
        assert_eq!(r310.current.check_in, Some(ymd(2025, 12, 30)));

        let last = store.last_success().await.unwrap().unwrap();
        assert_eq!(last.id, outcome.id);
        assert_eq!(last.actor, "Lan (FO)");
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let rec = reconciler("idempotent.wal");
        let rows = ten_rooms();

        rec.reconcile_full(&rows, "system").await;
        let first = rooms_without_timestamps(rec.store()).await;
        rec.reconcile_full(&rows, "system").await;
        let second = rooms_without_timestamps(rec.store()).await;

        assert_eq!(first, second);
        assert_eq!(rec.store().recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_row_skipped_rest_kept() {
        let rec = reconciler("partial_rows.wal");
        let mut rows = ten_rooms();
        rows[4][0] = "X".repeat(MAX_ROOM_NUMBER_LEN + 1);

        let outcome = rec.reconcile_full(&rows, "system").await;
        assert!(outcome.success);
        assert_eq!(outcome.rows, 9);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(rec.store().get_all().await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn blank_numbers_not_counted_duplicates_are() {
        let rec = reconciler("dupes.wal");
        let rows = grid(&[
            HEADER,
            &["101", "VD"],
            &["", "VC"],
            &["101", "OC"],
            &["102", "OC"],
        ]);

        let outcome = rec.reconcile_full(&rows, "system").await;
        assert_eq!(outcome.rows, 2);
        assert_eq!(outcome.skipped, 1);
        let r101 = rec.store().get_by_number("101").await.unwrap().unwrap();
        assert_eq!(r101.status.to_string(), "vd");
    }

    #[tokio::test]
    async fn empty_feed_keeps_existing_rooms() {
        let rec = reconciler("empty_feed.wal");
        rec.reconcile_full(&ten_rooms(), "system").await;

        let outcome = rec.reconcile_full(&grid(&[HEADER]), "system").await;
        assert!(!outcome.success);
        assert_eq!(rec.store().get_all().await.unwrap().len(), 10);
    }

    struct BrokenFeed;

    #[async_trait]
    impl FeedSource for BrokenFeed {
        async fn fetch(&self) -> Result<Vec<Vec<String>>, FeedError> {
            Err(FeedError::Status(503))
        }
    }

    #[tokio::test]
    async fn fetch_failure_records_outcome_and_leaves_store() {
        let rec = reconciler("fetch_failure.wal");
        rec.reconcile_full(&ten_rooms(), "system").await;

        let outcome = rec.resync(&BrokenFeed, "system").await;
        assert!(!outcome.success);
        assert_eq!(outcome.rows, 0);
        assert_eq!(outcome.error.as_deref(), Some("feed returned HTTP 503"));

        assert_eq!(rec.store().get_all().await.unwrap().len(), 10);
        let recent = rec.store().recent(1).await.unwrap();
        assert_eq!(recent[0].id, outcome.id);
    }

    #[tokio::test]
    async fn resync_from_static_feed() {
        let rec = reconciler("static_feed.wal");
        let feed = StaticFeed::from_rows(&[HEADER, &["101", "lock"]]);
        let outcome = rec.resync(&feed, "system").await;
        assert!(outcome.success);
        let r = rec.store().get_by_number("101").await.unwrap().unwrap();
        assert_eq!(r.status.to_string(), "lock");
    }

    /// Rooms can be read but never written.
    #[derive(Default)]
    struct ReadOnlyStore {
        outcomes: tokio::sync::Mutex<Vec<SyncOutcome>>,
    }

    #[async_trait]
    impl RoomStore for ReadOnlyStore {
        async fn get_by_number(&self, _: &str) -> Result<Option<RoomRecord>, StoreError> {
            Ok(None)
        }
        async fn get_all(&self) -> Result<Vec<RoomRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn replace_all(&self, _: Vec<RoomRecord>) -> Result<(), StoreError> {
            Err(StoreError::WalError("disk full".into()))
        }
        async fn update_fields(
            &self,
            n: &str,
            _: RoomPatch,
            _: Ms,
            _: Option<&RoomStatus>,
        ) -> Result<RoomUpdate, StoreError> {
            Err(StoreError::NotFound(n.to_string()))
        }
        async fn is_empty(&self) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn clear_all(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[async_trait]
    impl SyncHistory for ReadOnlyStore {
        async fn record(&self, outcome: SyncOutcome) -> Result<(), StoreError> {
            self.outcomes.lock().await.push(outcome);
            Ok(())
        }
        async fn recent(&self, limit: usize) -> Result<Vec<SyncOutcome>, StoreError> {
            Ok(self.outcomes.lock().await.iter().rev().take(limit).cloned().collect())
        }
        async fn last_success(&self) -> Result<Option<SyncOutcome>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn store_failure_becomes_failed_outcome() {
        let store = Arc::new(ReadOnlyStore::default());
        let rec = Reconciler::with_year(store.clone(), 2026);

        let outcome = rec.reconcile_full(&ten_rooms(), "system").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("WAL error: disk full"));
        assert_eq!(store.recent(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_unknown_room_is_not_found() {
        let rec = reconciler("update_missing.wal");
        let err = rec
            .apply_update("999", &RoomChanges::status("vc"), "Mai (HK)")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(n) if n == "999"));
    }

    #[tokio::test]
    async fn update_without_fields_rejected() {
        let rec = reconciler("update_empty.wal");
        rec.reconcile_full(&ten_rooms(), "system").await;
        let err = rec
            .apply_update("101", &RoomChanges::default(), "Lan (FO)")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoFields));
        assert_eq!(err.to_string(), "no fields to update");
    }

    #[tokio::test]
    async fn update_applies_only_present_fields() {
        let rec = reconciler("update_fields.wal");
        let rows = grid(&[HEADER, &["101", "OD", "", "Le", "30-12", "02-01", "1", "", "", "", "", "STD"]]);
        rec.reconcile_full(&rows, "system").await;

        let changes = RoomChanges {
            status: Some("VD/ARR".into()),
            next: Some(GuestInput {
                name: "Pham".into(),
                check_in: "02-01".into(),
                check_out: "05-01".into(),
                pax: "2 adults".into(),
            }),
            ..RoomChanges::default()
        };
        let out = rec.apply_update("101", &changes, "Lan (FO)").await.unwrap();

        assert!(out.status_changed());
        assert_eq!(out.old_status.to_string(), "od");
        assert_eq!(out.new_status.to_string(), "vd/arr");
        assert_eq!(out.room.room_type, "STD");
        assert_eq!(out.room.current.name, "Le");
        assert_eq!(out.room.next.name, "Pham");
        assert_eq!(out.room.next.check_in, Some(ymd(2026, 1, 2)));
        assert_eq!(out.room.next.pax, 2);
    }

    #[tokio::test]
    async fn blank_status_rejected() {
        let rec = reconciler("update_blank_status.wal");
        rec.reconcile_full(&ten_rooms(), "system").await;
        let err = rec
            .apply_update("101", &RoomChanges::status("  "), "Lan (FO)")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidField("status")));
    }
}
