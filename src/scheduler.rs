use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::desk::Desk;
use crate::store::{ActivityLog, RoomStore, Store, StoreError, SyncHistory};

/// How often the compactor looks at the WAL.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that resyncs from the feed every `period`. The first pass
/// waits a full period; startup runs its own initial sync.
pub async fn run_sync_loop<S>(desk: Arc<Desk<S>>, period: Duration)
where
    S: RoomStore + ActivityLog + SyncHistory + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        let outcome = desk.system_resync().await;
        if !outcome.success {
            tracing::debug!("scheduled resync failed, keeping current rooms");
        }
    }
}

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}

/// Compact when at least `threshold` appends landed since the last rewrite.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &Store, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    store.compact_wal().await?;
    info!(appends, "WAL compacted");
    Ok(true)
}
