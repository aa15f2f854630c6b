use std::sync::Arc;

use uuid::Uuid;

use crate::balance_client::BalanceRatingClient;
use crate::error::{CoreError, CoreResult};
use crate::model::{Player, Room, RoomStatus};
use crate::store::{self, RoomStore};

/// Create/join/leave semantics, funds checks, and player-list invariants.
/// Grounded on `internal/usecase/room.go`'s `RoomServiceImpl`.
pub struct RoomService {
    store: Arc<dyn RoomStore>,
    balance: Arc<dyn BalanceRatingClient>,
}

impl RoomService {
    pub fn new(store: Arc<dyn RoomStore>, balance: Arc<dyn BalanceRatingClient>) -> Self {
        RoomService { store, balance }
    }

    pub async fn create_room(&self, user_id: &str, bet: i64) -> CoreResult<Room> {
        if bet <= 0 {
            return Err(CoreError::InvalidBet);
        }
        let balance = self.balance.get_balance(user_id).await?;
        if balance < bet {
            return Err(CoreError::InsufficientFunds);
        }

        let room_id = Uuid::new_v4().to_string();
        let room = Room {
            id: room_id,
            status: RoomStatus::Waiting,
            bet,
            players: vec![Player::new(user_id)],
            turn: String::new(),
            deck: Vec::new(),
        };
        self.store.save_room(&room).await?;
        tracing::info!(room_id = %room.id, %user_id, bet, "room created");
        Ok(room)
    }

    pub async fn join_room(&self, user_id: &str, room_id: &str, bet: i64) -> CoreResult<Room> {
        let fields = self.store.get_all_room_fields(room_id).await?;
        if fields.is_empty() {
            return Err(CoreError::RoomNotFound);
        }

        let current_players = store::split_players(fields.get("players").map(String::as_str).unwrap_or(""));
        if current_players.len() >= 2 {
            return Err(CoreError::RoomFull);
        }
        if current_players.iter().any(|p| p == user_id) {
            return Err(CoreError::AlreadyInRoom);
        }

        let room_bet: i64 = fields
            .get("bet")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::Storage("room missing bet field".to_string()))?;
        if bet != room_bet {
            return Err(CoreError::BetMismatch {
                supplied: bet,
                room_bet,
            });
        }

        let balance = self.balance.get_balance(user_id).await?;
        if balance < room_bet {
            return Err(CoreError::InsufficientFunds);
        }

        let mut updated_ids = current_players.clone();
        updated_ids.push(user_id.to_string());
        let csv = store::join_players(&updated_ids);
        self.store.add_joining_player(room_id, user_id, &csv).await?;

        let fields = self.store.get_all_room_fields(room_id).await?;
        let room = store::reconstruct_room(room_id, &fields)
            .ok_or_else(|| CoreError::Storage("room vanished after join".to_string()))?;
        tracing::info!(room_id, %user_id, "player joined room");
        Ok(room)
    }

    /// Returns `(updated_room, was_room_deleted)`.
    pub async fn leave_room(&self, user_id: &str, room_id: &str) -> CoreResult<(Option<Room>, bool)> {
        let fields = self.store.get_all_room_fields(room_id).await?;
        if fields.is_empty() {
            return Err(CoreError::RoomNotFound);
        }
        let current_players = store::split_players(fields.get("players").map(String::as_str).unwrap_or(""));
        if !current_players.iter().any(|p| p == user_id) {
            return Err(CoreError::PlayerNotInRoom);
        }

        let remaining: Vec<String> = current_players.into_iter().filter(|p| p != user_id).collect();
        self.store
            .update_player_list(room_id, &store::join_players(&remaining))
            .await?;
        self.store.delete_player_specific_fields(room_id, user_id).await?;

        if remaining.is_empty() {
            self.store.delete_room(room_id).await?;
            tracing::info!(room_id, "room deleted: last player left");
            return Ok((None, true));
        }

        if remaining.len() == 1 {
            self.store.reset_player_state(room_id, &remaining[0]).await?;
            self.store.set_room_field(room_id, "status", "waiting").await?;
            self.store.set_room_field(room_id, "turn", "").await?;
        }

        let fields = self.store.get_all_room_fields(room_id).await?;
        let room = store::reconstruct_room(room_id, &fields)
            .ok_or_else(|| CoreError::Storage("room vanished after leave".to_string()))?;
        tracing::info!(room_id, %user_id, "player left room");
        Ok((Some(room), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRoomStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedBalance {
        balances: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl BalanceRatingClient for FixedBalance {
        async fn get_balance(&self, user_id: &str) -> CoreResult<i64> {
            Ok(*self.balances.lock().unwrap().get(user_id).unwrap_or(&0))
        }
        async fn add_balance(&self, user_id: &str, delta: i64) -> CoreResult<()> {
            *self.balances.lock().unwrap().entry(user_id.to_string()).or_insert(0) += delta;
            Ok(())
        }
        async fn subtract_balance(&self, user_id: &str, delta: i64) -> CoreResult<()> {
            *self.balances.lock().unwrap().entry(user_id.to_string()).or_insert(0) -= delta;
            Ok(())
        }
        async fn get_rating(&self, _user_id: &str) -> CoreResult<i64> {
            Ok(1000)
        }
    }

    fn service_with_balances(balances: &[(&str, i64)]) -> RoomService {
        let store = Arc::new(InMemoryRoomStore::new());
        let balances = balances.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let balance = Arc::new(FixedBalance {
            balances: Mutex::new(balances),
        });
        RoomService::new(store, balance)
    }

    #[tokio::test]
    async fn create_room_fails_on_nonpositive_bet() {
        let svc = service_with_balances(&[("a", 500)]);
        let err = svc.create_room("a", 0).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidBet));
    }

    #[tokio::test]
    async fn create_then_join_round_trip() {
        let svc = service_with_balances(&[("a", 500), ("b", 500)]);
        let room = svc.create_room("a", 100).await.unwrap();
        let joined = svc.join_room("b", &room.id, 100).await.unwrap();
        assert_eq!(joined.player_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn join_rejects_bet_mismatch() {
        let svc = service_with_balances(&[("a", 500), ("b", 500)]);
        let room = svc.create_room("a", 100).await.unwrap();
        let err = svc.join_room("b", &room.id, 101).await.unwrap_err();
        assert!(matches!(err, CoreError::BetMismatch { .. }));
    }

    #[tokio::test]
    async fn join_rejects_full_room() {
        let svc = service_with_balances(&[("a", 500), ("b", 500), ("c", 500)]);
        let room = svc.create_room("a", 100).await.unwrap();
        svc.join_room("b", &room.id, 100).await.unwrap();
        let err = svc.join_room("c", &room.id, 100).await.unwrap_err();
        assert!(matches!(err, CoreError::RoomFull));
    }

    #[tokio::test]
    async fn leave_room_deletes_when_empty() {
        let svc = service_with_balances(&[("a", 500)]);
        let room = svc.create_room("a", 100).await.unwrap();
        let (room, deleted) = svc.leave_room("a", &room.id).await.unwrap();
        assert!(room.is_none());
        assert!(deleted);
    }

    #[tokio::test]
    async fn leave_room_resets_sole_remaining_player() {
        let svc = service_with_balances(&[("a", 500), ("b", 500)]);
        let room = svc.create_room("a", 100).await.unwrap();
        svc.join_room("b", &room.id, 100).await.unwrap();
        let (room, deleted) = svc.leave_room("b", &room.id).await.unwrap();
        assert!(!deleted);
        let room = room.unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.turn, "");
    }
}
