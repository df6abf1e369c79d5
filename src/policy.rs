use std::fmt;

use crate::model::{ActionKind, BaseStatus, RoomStatus, StatusCode};

/// Outbound edges for each base code. `lock` and `do` are terminal.
pub fn allowed_targets(code: StatusCode) -> &'static [StatusCode] {
    use StatusCode::*;
    match code {
        Vd => &[Vc],
        Vc => &[Vd, Ip],
        Od => &[Oc, Dnd, Nn],
        Oc => &[Od],
        Dnd => &[Nn, Oc, Od],
        Nn => &[Dnd, Oc, Od],
        Ip => &[Vc],
        Lock | Do => &[],
    }
}

/// Whether a base status has any outbound edge at all.
pub fn has_outbound(base: &BaseStatus) -> bool {
    base.code().is_some_and(|c| !allowed_targets(c).is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The current status is terminal or not in the table.
    NoOutbound(BaseStatus),
    NotAllowed { from: BaseStatus, to: BaseStatus },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::NoOutbound(from) => {
                write!(f, "no transitions allowed from status '{from}'")
            }
            TransitionError::NotAllowed { from, to } => {
                write!(f, "transition '{from}' -> '{to}' not allowed")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Check a base-status move against the table. Arrival markers play no part.
/// Only housekeeping moves go through here.
pub fn check_transition(current: &BaseStatus, target: &BaseStatus) -> Result<(), TransitionError> {
    let allowed = current
        .code()
        .map(allowed_targets)
        .filter(|targets| !targets.is_empty())
        .ok_or_else(|| TransitionError::NoOutbound(current.clone()))?;

    match target.code() {
        Some(t) if allowed.contains(&t) => Ok(()),
        _ => Err(TransitionError::NotAllowed {
            from: current.clone(),
            to: target.clone(),
        }),
    }
}

/// Status after moving to `target`: the arrival marker survives a
/// vacant-dirty/vacant-clean cycle and is dropped everywhere else.
pub fn carry_arrival(current: &RoomStatus, target: &BaseStatus) -> RoomStatus {
    let keep = current.arrival()
        && matches!(target.code(), Some(StatusCode::Vd | StatusCode::Vc));
    RoomStatus::new(target.clone(), keep)
}

/// Resolve a requested status against the current one. An explicit marker on
/// the request wins; otherwise [`carry_arrival`] decides.
pub fn next_status(current: &RoomStatus, requested: &RoomStatus) -> RoomStatus {
    if requested.arrival() {
        requested.clone()
    } else {
        carry_arrival(current, requested.base())
    }
}

/// The transitions worth an activity-log entry, and their category.
pub fn logged_action(old: &RoomStatus, new: &RoomStatus) -> Option<ActionKind> {
    use StatusCode::*;
    match (old.code()?, old.arrival(), new.code()?, new.arrival()) {
        (Vd, false, Vc, false) | (Vd, true, Vc, true) => Some(ActionKind::VacantCleaned),
        (Od, _, Oc | Dnd | Nn, _) => Some(ActionKind::OccupiedServiced),
        _ => None,
    }
}
