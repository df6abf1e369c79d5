use std::fmt;
use std::sync::Arc;

use ulid::Ulid;

use crate::feed::FeedSource;
use crate::model::*;
use crate::policy::{self, TransitionError};
use crate::reconcile::{EngineError, Reconciler, UpdateOutcome};
use crate::store::{ActivityLog, RoomStore, StoreError, SyncHistory};

/// Identity recorded for syncs nobody asked for.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug)]
pub enum DeskError {
    Forbidden(&'static str),
    Transition(TransitionError),
    Engine(EngineError),
}

impl fmt::Display for DeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeskError::Forbidden(what) => write!(f, "permission denied: {what}"),
            DeskError::Transition(e) => write!(f, "{e}"),
            DeskError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DeskError {}

impl From<EngineError> for DeskError {
    fn from(e: EngineError) -> Self {
        DeskError::Engine(e)
    }
}

impl From<StoreError> for DeskError {
    fn from(e: StoreError) -> Self {
        DeskError::Engine(e.into())
    }
}

impl From<TransitionError> for DeskError {
    fn from(e: TransitionError) -> Self {
        metrics::counter!(crate::observability::TRANSITIONS_REJECTED_TOTAL).increment(1);
        DeskError::Transition(e)
    }
}

/// Staff-facing operations: role gating, housekeeping policy and activity
/// logging on top of the reconciler.
pub struct Desk<S> {
    reconciler: Reconciler<S>,
    feed: Arc<dyn FeedSource>,
}

impl<S> Desk<S>
where
    S: RoomStore + ActivityLog + SyncHistory + 'static,
{
    pub fn new(reconciler: Reconciler<S>, feed: Arc<dyn FeedSource>) -> Self {
        Self { reconciler, feed }
    }

    pub fn store(&self) -> &Arc<S> {
        self.reconciler.store()
    }

    async fn room(&self, number: &str) -> Result<RoomRecord, DeskError> {
        self.store()
            .get_by_number(number)
            .await?
            .ok_or_else(|| DeskError::Engine(EngineError::NotFound(number.to_string())))
    }

    /// Quick status change. Housekeeping moves are checked against the
    /// transition table; the arrival marker is carried across a vd/vc cycle.
    pub async fn change_status(
        &self,
        actor: &Actor,
        number: &str,
        target: &str,
    ) -> Result<UpdateOutcome, DeskError> {
        if target.trim().is_empty() {
            return Err(EngineError::InvalidField("status").into());
        }
        let requested = RoomStatus::parse(target);
        let current = self.room(number).await?;

        if actor.role == Role::Housekeeping {
            policy::check_transition(current.status.base(), requested.base())?;
        }

        let patch = RoomPatch {
            status: Some(policy::next_status(&current.status, &requested)),
            ..RoomPatch::default()
        };
        let outcome = self
            .reconciler
            .apply_patch(number, patch, &actor.identity(), Some(&current.status))
            .await?;
        tracing::info!(
            room = number,
            actor = %actor.identity(),
            from = %outcome.old_status,
            to = %outcome.new_status,
            "status changed"
        );
        self.record_activity(actor, &outcome).await;
        Ok(outcome)
    }

    /// Full edit of a room. Housekeeping staff can only edit rooms whose
    /// status has somewhere to go, and a new status must pass the table.
    pub async fn update_room(
        &self,
        actor: &Actor,
        number: &str,
        changes: &RoomChanges,
    ) -> Result<UpdateOutcome, DeskError> {
        let patch = self.reconciler.resolve_changes(changes)?;

        let mut checked = None;
        if actor.role == Role::Housekeeping {
            let current = self.room(number).await?;
            if !policy::has_outbound(current.status.base()) {
                return Err(TransitionError::NoOutbound(current.status.base().clone()).into());
            }
            if let Some(target) = &patch.status {
                policy::check_transition(current.status.base(), target.base())?;
            }
            checked = Some(current.status);
        }

        let outcome = self
            .reconciler
            .apply_patch(number, patch, &actor.identity(), checked.as_ref())
            .await?;
        if outcome.status_changed() {
            self.record_activity(actor, &outcome).await;
        }
        Ok(outcome)
    }

    /// Statuses the room may move to under the housekeeping table.
    pub async fn allowed_next(&self, number: &str) -> Result<&'static [StatusCode], DeskError> {
        let room = self.room(number).await?;
        Ok(room.status.code().map(policy::allowed_targets).unwrap_or(&[]))
    }

    pub async fn resync(&self, actor: &Actor) -> Result<SyncOutcome, DeskError> {
        require_front_office(actor, "resync")?;
        Ok(self
            .reconciler
            .resync(self.feed.as_ref(), &actor.identity())
            .await)
    }

    /// Resync on nobody's behalf: startup and the periodic loop.
    pub async fn system_resync(&self) -> SyncOutcome {
        self.reconciler
            .resync(self.feed.as_ref(), SYSTEM_ACTOR)
            .await
    }

    /// Populate an empty store from the feed. Returns `None` when rooms
    /// already exist.
    pub async fn initial_sync(&self) -> Result<Option<SyncOutcome>, DeskError> {
        if !self.store().is_empty().await? {
            return Ok(None);
        }
        tracing::info!("store is empty, running initial sync");
        Ok(Some(self.system_resync().await))
    }

    pub async fn clear_activity(&self, actor: &Actor) -> Result<(), DeskError> {
        require_front_office(actor, "clear activity log")?;
        ActivityLog::clear_all(self.store().as_ref()).await?;
        tracing::warn!(actor = %actor.identity(), "activity log cleared");
        Ok(())
    }

    pub async fn clear_rooms(&self, actor: &Actor) -> Result<(), DeskError> {
        require_front_office(actor, "clear rooms")?;
        RoomStore::clear_all(self.store().as_ref()).await?;
        tracing::warn!(actor = %actor.identity(), "all rooms cleared");
        Ok(())
    }

    /// Append an activity entry when the move is on the allow-list. A failed
    /// append is logged; the status change already happened.
    async fn record_activity(&self, actor: &Actor, outcome: &UpdateOutcome) {
        let Some(kind) = policy::logged_action(&outcome.old_status, &outcome.new_status) else {
            return;
        };
        let old = outcome.old_status.to_string();
        let new = outcome.new_status.to_string();
        let entry = ActivityEntry {
            id: Ulid::new(),
            at: outcome.room.updated_at,
            actor: actor.name.clone(),
            role: actor.role,
            room: outcome.room.number.clone(),
            kind,
            detail: format!("{} → {}", old.to_uppercase(), new.to_uppercase()),
            old_status: Some(old),
            new_status: Some(new),
        };
        if let Err(e) = self.store().append(entry).await {
            tracing::error!(room = %outcome.room.number, error = %e, "could not log activity");
        }
    }
}

fn require_front_office(actor: &Actor, what: &'static str) -> Result<(), DeskError> {
    match actor.role {
        Role::FrontOffice => Ok(()),
        Role::Housekeeping => Err(DeskError::Forbidden(what)),
    }
}
