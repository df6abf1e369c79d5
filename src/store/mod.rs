mod error;
mod journal;
mod rooms;

pub use error::StoreError;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

/// Room records keyed by number.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get_by_number(&self, number: &str) -> Result<Option<RoomRecord>, StoreError>;
    /// All rooms, ordered by room number.
    async fn get_all(&self) -> Result<Vec<RoomRecord>, StoreError>;
    /// Swap the whole room set in one step. Readers see the old set or the
    /// new one, never a mix.
    async fn replace_all(&self, rooms: Vec<RoomRecord>) -> Result<(), StoreError>;
    /// Apply the present fields of `patch`. With `expected` set, the update
    /// is refused unless the room still has that status.
    async fn update_fields(
        &self,
        number: &str,
        patch: RoomPatch,
        at: Ms,
        expected: Option<&RoomStatus>,
    ) -> Result<RoomUpdate, StoreError>;
    async fn is_empty(&self) -> Result<bool, StoreError>;
    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// Append-only staff activity.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: ActivityEntry) -> Result<(), StoreError>;
    /// Entries at or after `start`, oldest first.
    async fn query_since(&self, start: Ms) -> Result<Vec<ActivityEntry>, StoreError>;
    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// Append-only record of reconciliation passes.
#[async_trait]
pub trait SyncHistory: Send + Sync {
    async fn record(&self, outcome: SyncOutcome) -> Result<(), StoreError>;
    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<SyncOutcome>, StoreError>;
    async fn last_success(&self) -> Result<Option<SyncOutcome>, StoreError>;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL and batches appends: block for the first append, drain
/// whatever else is already queued, then fsync once for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so stray bytes don't ride into the
    // next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_snapshot(wal.path(), &events).and_then(|()| wal.swap_snapshot());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) rooms: BTreeMap<String, RoomRecord>,
    pub(crate) activity: Vec<ActivityEntry>,
    pub(crate) syncs: Vec<SyncOutcome>,
}

impl StoreState {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::RoomsReplaced { rooms } => {
                self.rooms = rooms
                    .iter()
                    .map(|r| (r.number.clone(), r.clone()))
                    .collect();
            }
            Event::RoomUpdated { number, patch, at } => {
                if let Some(room) = self.rooms.get_mut(number) {
                    patch.apply_to(room, *at);
                }
            }
            Event::RoomsCleared => self.rooms.clear(),
            Event::SyncRecorded { outcome } => {
                self.syncs.push(outcome.clone());
                trim_front(&mut self.syncs, MAX_SYNC_HISTORY);
            }
            Event::ActivityAppended { entry } => {
                self.activity.push(entry.clone());
                trim_front(&mut self.activity, MAX_ACTIVITY_ENTRIES);
            }
            Event::ActivityCleared => self.activity.clear(),
        }
    }

    /// Events that rebuild this state from nothing.
    fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(1 + self.syncs.len() + self.activity.len());
        events.push(Event::RoomsReplaced {
            rooms: self.rooms.values().cloned().collect(),
        });
        events.extend(
            self.syncs
                .iter()
                .map(|outcome| Event::SyncRecorded { outcome: outcome.clone() }),
        );
        events.extend(
            self.activity
                .iter()
                .map(|entry| Event::ActivityAppended { entry: entry.clone() }),
        );
        events
    }
}

fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

/// WAL-backed implementation of [`RoomStore`], [`ActivityLog`] and
/// [`SyncHistory`]. Mutations are logged before they are applied, under the
/// same write lock, so replay rebuilds exactly what readers saw.
pub struct Store {
    pub(crate) state: RwLock<StoreState>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Store {
    /// Replay the log at `wal_path` and start the writer task. Must run inside
    /// a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.truncated {
            Wal::truncate_to(&wal_path, replay.valid_len)?;
            tracing::warn!(
                path = %wal_path.display(),
                recovered = replay.events.len(),
                kept_bytes = replay.valid_len,
                "discarded torn WAL tail"
            );
        }

        let mut state = StoreState::default();
        for event in &replay.events {
            state.apply(event);
        }
        tracing::info!(
            rooms = state.rooms.len(),
            activity = state.activity.len(),
            syncs = state.syncs.len(),
            "store replayed"
        );

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            state: RwLock::new(state),
            wal_tx,
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// WAL-append, then apply. The caller holds the write lock.
    async fn persist_and_apply(&self, state: &mut StoreState, event: Event) -> Result<(), StoreError> {
        self.wal_append(&event).await?;
        state.apply(&event);
        Ok(())
    }

    /// Rewrite the WAL as a snapshot of the current state.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        // The read guard keeps writers out until the swap is done, so no
        // append can land in the log being replaced.
        let state = self.state.read().await;
        let events = state.snapshot();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
