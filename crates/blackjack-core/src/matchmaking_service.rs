use std::sync::Arc;

use crate::balance_client::BalanceRatingClient;
use crate::error::CoreResult;
use crate::model::Match;
use crate::room_service::RoomService;
use crate::store::RoomStore;

/// Ranked bet for automatic matchmaking, carried forward unchanged from
/// `internal/usecase/ranked.go`'s `FindMatch`.
const RANKED_BET: i64 = 2500;

/// Pairs players by rating into fresh rooms. Grounded on
/// `internal/usecase/ranked.go`'s `RankedUseCase`.
pub struct MatchmakingService {
    store: Arc<dyn RoomStore>,
    balance: Arc<dyn BalanceRatingClient>,
    rooms: Arc<RoomService>,
    mmr_range: i64,
}

impl MatchmakingService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        balance: Arc<dyn BalanceRatingClient>,
        rooms: Arc<RoomService>,
        mmr_range: i64,
    ) -> Self {
        MatchmakingService {
            store,
            balance,
            rooms,
            mmr_range,
        }
    }

    /// Looks for a waiting opponent within rating range. If none exists yet, enqueues the
    /// caller and returns `Ok(None)`; the caller is expected to keep waiting for a later
    /// `find_match` call (from another player joining) to produce their `Match`.
    pub async fn find_match(&self, user_id: &str) -> CoreResult<Option<Match>> {
        let rating = self.balance.get_rating(user_id).await?;

        let opponent = self.store.find_opponent(user_id, rating, self.mmr_range).await?;
        let Some(opponent) = opponent else {
            self.store.add_to_pool(user_id, rating).await?;
            tracing::info!(%user_id, rating, "enqueued for ranked matchmaking");
            return Ok(None);
        };

        // Safety call mirroring the reference implementation: `find_opponent` already removed
        // the opponent atomically, but the caller itself may also be sitting in the pool from
        // an earlier, now-superseded enqueue.
        self.store.remove_from_pool(&[user_id.to_string()]).await?;

        let room = self.rooms.create_room(user_id, RANKED_BET).await?;
        self.rooms.join_room(&opponent.id, &room.id, RANKED_BET).await?;

        tracing::info!(room_id = %room.id, %user_id, opponent = %opponent.id, "ranked match found");
        Ok(Some(Match {
            room_id: room.id,
            players: [user_id.to_string(), opponent.id],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult as Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use crate::store::InMemoryRoomStore;

    struct RatedBalance {
        ratings: Mutex<HashMap<String, i64>>,
        balances: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl BalanceRatingClient for RatedBalance {
        async fn get_balance(&self, user_id: &str) -> Result<i64> {
            Ok(*self.balances.lock().unwrap().get(user_id).unwrap_or(&100_000))
        }
        async fn add_balance(&self, user_id: &str, delta: i64) -> Result<()> {
            *self.balances.lock().unwrap().entry(user_id.to_string()).or_insert(0) += delta;
            Ok(())
        }
        async fn subtract_balance(&self, user_id: &str, delta: i64) -> Result<()> {
            *self.balances.lock().unwrap().entry(user_id.to_string()).or_insert(0) -= delta;
            Ok(())
        }
        async fn get_rating(&self, user_id: &str) -> Result<i64> {
            self.ratings
                .lock()
                .unwrap()
                .get(user_id)
                .copied()
                .ok_or_else(|| CoreError::Upstream("no rating on file".to_string()))
        }
    }

    fn service(ratings: &[(&str, i64)]) -> MatchmakingService {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let balance: Arc<dyn BalanceRatingClient> = Arc::new(RatedBalance {
            ratings: Mutex::new(ratings.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
            balances: Mutex::new(HashMap::new()),
        });
        let rooms = Arc::new(RoomService::new(store.clone(), balance.clone()));
        MatchmakingService::new(store, balance, rooms, 100)
    }

    #[tokio::test]
    async fn first_searcher_is_enqueued_with_no_match() {
        let svc = service(&[("a", 1200)]);
        let result = svc.find_match("a").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn second_searcher_within_range_is_paired() {
        let svc = service(&[("a", 1200), ("b", 1250)]);
        svc.find_match("a").await.unwrap();
        let result = svc.find_match("b").await.unwrap();
        let m = result.unwrap();
        assert!(m.players.contains(&"a".to_string()));
        assert!(m.players.contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn searcher_outside_range_stays_queued() {
        let svc = service(&[("a", 1200), ("b", 2000)]);
        svc.find_match("a").await.unwrap();
        let result = svc.find_match("b").await.unwrap();
        assert!(result.is_none());
    }
}
