use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::status;

/// Unix milliseconds. Every stored timestamp uses this.
pub type Ms = i64;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// The nine housekeeping codes the hotel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusCode {
    /// Vacant dirty.
    Vd,
    /// Vacant clean.
    Vc,
    /// Occupied dirty.
    Od,
    /// Occupied clean.
    Oc,
    /// Do not disturb.
    Dnd,
    /// No need (guest declined service).
    Nn,
    /// Locked out of service.
    Lock,
    /// Inspection pending.
    Ip,
    /// Due out.
    Do,
}

impl StatusCode {
    pub const ALL: [StatusCode; 9] = [
        StatusCode::Vd,
        StatusCode::Vc,
        StatusCode::Od,
        StatusCode::Oc,
        StatusCode::Dnd,
        StatusCode::Nn,
        StatusCode::Lock,
        StatusCode::Ip,
        StatusCode::Do,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Vd => "vd",
            StatusCode::Vc => "vc",
            StatusCode::Od => "od",
            StatusCode::Oc => "oc",
            StatusCode::Dnd => "dnd",
            StatusCode::Nn => "nn",
            StatusCode::Lock => "lock",
            StatusCode::Ip => "ip",
            StatusCode::Do => "do",
        }
    }

    /// Case-insensitive lookup of a raw code.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        StatusCode::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
    }

    /// Only vacant-dirty, vacant-clean and due-out rooms can expect an arrival.
    pub fn arrival_eligible(self) -> bool {
        matches!(self, StatusCode::Vd | StatusCode::Vc | StatusCode::Do)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A base status: one of the known codes, or a code the hotel added later
/// that is carried through lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseStatus {
    Known(StatusCode),
    Unrecognized(String),
}

impl BaseStatus {
    pub fn from_code(raw: &str) -> Self {
        match StatusCode::from_code(raw) {
            Some(code) => BaseStatus::Known(code),
            None => BaseStatus::Unrecognized(raw.trim().to_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BaseStatus::Known(code) => code.as_str(),
            BaseStatus::Unrecognized(s) => s,
        }
    }

    pub fn code(&self) -> Option<StatusCode> {
        match self {
            BaseStatus::Known(code) => Some(*code),
            BaseStatus::Unrecognized(_) => None,
        }
    }

    pub fn arrival_eligible(&self) -> bool {
        self.code().is_some_and(StatusCode::arrival_eligible)
    }
}

impl From<StatusCode> for BaseStatus {
    fn from(code: StatusCode) -> Self {
        BaseStatus::Known(code)
    }
}

impl fmt::Display for BaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical room status: a base status plus the arrival marker.
///
/// The marker is dropped at construction when the base status cannot carry
/// it, so a `RoomStatus` never renders as e.g. `od/arr`. Serialized as the
/// combined string so the invariant is re-applied on load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct RoomStatus {
    base: BaseStatus,
    arrival: bool,
}

impl RoomStatus {
    pub fn new(base: impl Into<BaseStatus>, arrival: bool) -> Self {
        let base = base.into();
        let arrival = arrival && base.arrival_eligible();
        Self { base, arrival }
    }

    /// Parse a combined string such as `vd/arr`.
    pub fn parse(combined: &str) -> Self {
        let (base, arrival) = status::split_status(combined);
        Self::new(base, arrival)
    }

    pub fn base(&self) -> &BaseStatus {
        &self.base
    }

    pub fn code(&self) -> Option<StatusCode> {
        self.base.code()
    }

    pub fn arrival(&self) -> bool {
        self.arrival
    }
}

impl Default for RoomStatus {
    fn default() -> Self {
        RoomStatus::new(StatusCode::Vc, false)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.arrival { status::ARRIVAL_MARKER } else { "" };
        f.write_str(&status::combine_status(&self.base, marker))
    }
}

impl From<RoomStatus> for String {
    fn from(status: RoomStatus) -> Self {
        status.to_string()
    }
}

impl From<String> for RoomStatus {
    fn from(combined: String) -> Self {
        RoomStatus::parse(&combined)
    }
}

/// One guest stay attached to a room (current or next).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestBlock {
    pub name: String,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub pax: u32,
}

/// Raw guest fields as typed by staff or read from the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestInput {
    pub name: String,
    pub check_in: String,
    pub check_out: String,
    pub pax: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub number: String,
    pub room_type: String,
    pub status: RoomStatus,
    pub current: GuestBlock,
    pub next: GuestBlock,
    pub updated_at: Ms,
}

impl RoomRecord {
    pub fn new(number: impl Into<String>, status: RoomStatus) -> Self {
        Self {
            number: number.into(),
            room_type: String::new(),
            status,
            current: GuestBlock::default(),
            next: GuestBlock::default(),
            updated_at: 0,
        }
    }

    /// Floor key: the first character of the room number.
    pub fn floor(&self) -> String {
        self.number
            .chars()
            .next()
            .map_or_else(|| "0".to_string(), |c| c.to_string())
    }

    pub fn has_next_guest(&self) -> bool {
        !self.next.name.trim().is_empty()
    }
}

/// Field-level change request as the caller sends it: raw strings, and only
/// the fields that should change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomChanges {
    pub status: Option<String>,
    pub current: Option<GuestInput>,
    pub next: Option<GuestInput>,
    pub room_type: Option<String>,
}

impl RoomChanges {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.current.is_none()
            && self.next.is_none()
            && self.room_type.is_none()
    }
}

/// A room just before and just after one field-level update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomUpdate {
    pub before: RoomRecord,
    pub after: RoomRecord,
}

/// Resolved fields written to the store. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub current: Option<GuestBlock>,
    pub next: Option<GuestBlock>,
    pub room_type: Option<String>,
}

impl RoomPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.current.is_none()
            && self.next.is_none()
            && self.room_type.is_none()
    }

    pub fn apply_to(&self, room: &mut RoomRecord, at: Ms) {
        if let Some(status) = &self.status {
            room.status = status.clone();
        }
        if let Some(current) = &self.current {
            room.current = current.clone();
        }
        if let Some(next) = &self.next {
            room.next = next.clone();
        }
        if let Some(room_type) = &self.room_type {
            room.room_type = room_type.clone();
        }
        room.updated_at = at;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Front office: may set any status and run administrative operations.
    FrontOffice,
    /// Housekeeping: status changes go through the transition policy.
    Housekeeping,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::FrontOffice => "FO",
            Role::Housekeeping => "HK",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fo" | "front_office" => Some(Role::FrontOffice),
            "hk" | "housekeeping" => Some(Role::Housekeeping),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is acting: a staff member and their role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    /// Identity string recorded on sync outcomes, e.g. `Lan (FO)`.
    pub fn identity(&self) -> String {
        format!("{} ({})", self.name, self.role)
    }
}

/// Category of a logged activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    /// A vacant room was cleaned (`vd → vc`).
    VacantCleaned,
    /// An occupied room was serviced, declined or marked do-not-disturb.
    OccupiedServiced,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::VacantCleaned => "vacant_cleaned",
            ActionKind::OccupiedServiced => "occupied_serviced",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Ulid,
    pub at: Ms,
    pub actor: String,
    pub role: Role,
    pub room: String,
    pub kind: ActionKind,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub detail: String,
}

/// Result of one reconciliation pass. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub id: Ulid,
    pub at: Ms,
    pub actor: String,
    pub rows: usize,
    pub skipped: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn succeeded(actor: &str, at: Ms, rows: usize, skipped: usize) -> Self {
        Self {
            id: Ulid::new(),
            at,
            actor: actor.to_string(),
            rows,
            skipped,
            success: true,
            error: None,
        }
    }

    pub fn failed(actor: &str, at: Ms, skipped: usize, error: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            at,
            actor: actor.to_string(),
            rows: 0,
            skipped,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Whole room set swapped by a resync (or a compaction snapshot).
    RoomsReplaced { rooms: Vec<RoomRecord> },
    RoomUpdated { number: String, patch: RoomPatch, at: Ms },
    RoomsCleared,
    SyncRecorded { outcome: SyncOutcome },
    ActivityAppended { entry: ActivityEntry },
    ActivityCleared,
}
