use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone};

use crate::model::*;
use crate::store::{ActivityLog, StoreError};

/// The housekeeping day starts at 08:15.
pub fn default_report_start() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 15, 0).expect("valid time")
}

/// Start of the report window containing `now`: today's start time, or
/// yesterday's when `now` is earlier than that.
pub fn window_start(now: NaiveDateTime, start: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(start);
    if now < today {
        today - Duration::days(1)
    } else {
        today
    }
}

/// [`window_start`] in local time, as Unix milliseconds.
pub fn window_start_ms(now: DateTime<Local>, start: NaiveTime) -> Ms {
    let naive = window_start(now.naive_local(), start);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        // The start time fell into a DST gap; the naive value read as UTC is
        // within an hour of it.
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// Activity in the current window, newest first.
pub async fn activity_report<L: ActivityLog + ?Sized>(
    log: &L,
    now: DateTime<Local>,
    start: NaiveTime,
) -> Result<Vec<ActivityEntry>, StoreError> {
    let mut entries = log.query_since(window_start_ms(now, start)).await?;
    entries.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.id.cmp(&a.id)));
    Ok(entries)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffStats {
    pub name: String,
    pub role: Role,
    pub total: usize,
    pub vacant_cleaned: usize,
    pub occupied_serviced: usize,
}

/// Per-staff counts by action category, ordered by name.
pub fn staff_stats(entries: &[ActivityEntry]) -> Vec<StaffStats> {
    let mut by_name: BTreeMap<&str, StaffStats> = BTreeMap::new();
    for e in entries {
        let stats = by_name.entry(e.actor.as_str()).or_insert_with(|| StaffStats {
            name: e.actor.clone(),
            role: e.role,
            total: 0,
            vacant_cleaned: 0,
            occupied_serviced: 0,
        });
        stats.total += 1;
        match e.kind {
            ActionKind::VacantCleaned => stats.vacant_cleaned += 1,
            ActionKind::OccupiedServiced => stats.occupied_serviced += 1,
        }
    }
    by_name.into_values().collect()
}

/// Room count per canonical status string (`vd`, `vc/arr`, ...).
pub fn status_counts(rooms: &[RoomRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for r in rooms {
        *counts.entry(r.status.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Rooms keyed by floor, each floor in room-number order.
pub fn rooms_by_floor(rooms: &[RoomRecord]) -> BTreeMap<String, Vec<RoomRecord>> {
    let mut floors: BTreeMap<String, Vec<RoomRecord>> = BTreeMap::new();
    for r in rooms {
        floors.entry(r.floor()).or_default().push(r.clone());
    }
    for list in floors.values_mut() {
        list.sort_by(|a, b| a.number.cmp(&b.number));
    }
    floors
}

/// Rooms with a next guest, earliest check-in first; rooms without a
/// check-in date go last.
pub fn arrivals(rooms: &[RoomRecord]) -> Vec<RoomRecord> {
    let mut list: Vec<RoomRecord> = rooms.iter().filter(|r| r.has_next_guest()).cloned().collect();
    list.sort_by(|a, b| {
        let key = |r: &RoomRecord| (r.next.check_in.is_none(), r.next.check_in);
        key(a).cmp(&key(b)).then_with(|| a.number.cmp(&b.number))
    });
    list
}
