use async_trait::async_trait;

use crate::model::*;

use super::{ActivityLog, Store, StoreError, SyncHistory};

#[async_trait]
impl ActivityLog for Store {
    async fn append(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.persist_and_apply(&mut state, Event::ActivityAppended { entry })
            .await
    }

    async fn query_since(&self, start: Ms) -> Result<Vec<ActivityEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .activity
            .iter()
            .filter(|e| e.at >= start)
            .cloned()
            .collect())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.persist_and_apply(&mut state, Event::ActivityCleared).await
    }
}

#[async_trait]
impl SyncHistory for Store {
    async fn record(&self, outcome: SyncOutcome) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.persist_and_apply(&mut state, Event::SyncRecorded { outcome })
            .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SyncOutcome>, StoreError> {
        let state = self.state.read().await;
        Ok(state.syncs.iter().rev().take(limit).cloned().collect())
    }

    async fn last_success(&self) -> Result<Option<SyncOutcome>, StoreError> {
        let state = self.state.read().await;
        Ok(state.syncs.iter().rev().find(|s| s.success).cloned())
    }
}
