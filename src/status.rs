use crate::model::{BaseStatus, RoomStatus};

/// Marker value meaning "a guest is expected to arrive".
pub const ARRIVAL_MARKER: &str = "arr";

const ARRIVAL_SUFFIX: &str = "/arr";

/// Map a raw status code and arrival flag from the feed to a canonical status.
///
/// Known codes are matched case-insensitively; anything else is lower-cased
/// and carried through. The flag only counts when it reads `ARR` and the base
/// status is arrival-eligible.
pub fn normalize_status(raw_status: &str, raw_arrival: &str) -> RoomStatus {
    let base = BaseStatus::from_code(raw_status);
    let arrival = raw_arrival.trim().eq_ignore_ascii_case(ARRIVAL_MARKER);
    RoomStatus::new(base, arrival)
}

/// Reattach the arrival marker to a base status, under the same eligibility
/// rule as [`normalize_status`].
pub fn combine_status(base: &BaseStatus, marker: &str) -> String {
    if marker.trim().eq_ignore_ascii_case(ARRIVAL_MARKER) && base.arrival_eligible() {
        format!("{}{ARRIVAL_SUFFIX}", base.as_str())
    } else {
        base.as_str().to_string()
    }
}

/// Split a combined status string into its base and whether it carried the
/// arrival suffix. Eligibility is not checked here; [`RoomStatus::new`] does.
pub fn split_status(combined: &str) -> (BaseStatus, bool) {
    let lower = combined.trim().to_ascii_lowercase();
    match lower.strip_suffix(ARRIVAL_SUFFIX) {
        Some(base) => (BaseStatus::from_code(base), true),
        None => (BaseStatus::from_code(&lower), false),
    }
}

pub fn extract_base(combined: &str) -> BaseStatus {
    split_status(combined).0
}
