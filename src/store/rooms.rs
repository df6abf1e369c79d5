use async_trait::async_trait;

use crate::limits::*;
use crate::model::*;

use super::{RoomStore, Store, StoreError};

#[async_trait]
impl RoomStore for Store {
    async fn get_by_number(&self, number: &str) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.state.read().await.rooms.get(number).cloned())
    }

    async fn get_all(&self) -> Result<Vec<RoomRecord>, StoreError> {
        Ok(self.state.read().await.rooms.values().cloned().collect())
    }

    async fn replace_all(&self, rooms: Vec<RoomRecord>) -> Result<(), StoreError> {
        if rooms.len() > MAX_ROOMS {
            return Err(StoreError::LimitExceeded("too many rooms"));
        }
        let mut state = self.state.write().await;
        self.persist_and_apply(&mut state, Event::RoomsReplaced { rooms })
            .await?;
        metrics::gauge!(crate::observability::ROOMS).set(state.rooms.len() as f64);
        Ok(())
    }

    async fn update_fields(
        &self,
        number: &str,
        patch: RoomPatch,
        at: Ms,
        expected: Option<&RoomStatus>,
    ) -> Result<RoomUpdate, StoreError> {
        let mut state = self.state.write().await;
        let before = state
            .rooms
            .get(number)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(number.to_string()))?;
        if let Some(expected) = expected {
            if &before.status != expected {
                return Err(StoreError::StatusChanged {
                    number: number.to_string(),
                    found: before.status.to_string(),
                });
            }
        }
        let event = Event::RoomUpdated {
            number: number.to_string(),
            patch,
            at,
        };
        self.persist_and_apply(&mut state, event).await?;
        let after = state
            .rooms
            .get(number)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(number.to_string()))?;
        Ok(RoomUpdate { before, after })
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.state.read().await.rooms.is_empty())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.persist_and_apply(&mut state, Event::RoomsCleared).await?;
        metrics::gauge!(crate::observability::ROOMS).set(0.0);
        Ok(())
    }
}
