use std::collections::HashMap;
use std::sync::Arc;

use crate::balance_client::BalanceRatingClient;
use crate::card::{self, Card};
use crate::error::{CoreError, CoreResult};
use crate::event_bus::{EventBus, GameResultEvent};
use crate::model::{DisconnectOutcome, GameEndData, PlayerReadyResult, RoundOutcome, RoomStatus};
use crate::store::{self, BoolFlag, RoomStore};

/// The round state machine: ready/hit/stand, deck management, score computation,
/// end-of-round settlement, and disconnect recovery. Grounded on
/// `internal/usecase/game.go`'s `GameUseCase` implementation.
pub struct GameService {
    store: Arc<dyn RoomStore>,
    balance: Arc<dyn BalanceRatingClient>,
    event_bus: Arc<dyn EventBus>,
}

impl GameService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        balance: Arc<dyn BalanceRatingClient>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        GameService {
            store,
            balance,
            event_bus,
        }
    }

    pub async fn player_ready(
        &self,
        user_id: &str,
        room_id: &str,
        is_ready: bool,
    ) -> CoreResult<PlayerReadyResult> {
        let existing = self.store.get_all_room_fields(room_id).await?;
        if existing.is_empty() {
            return Err(CoreError::RoomNotFound);
        }

        self.store
            .set_room_field(room_id, &format!("readyStatus.{user_id}"), BoolFlag::encode(is_ready))
            .await?;

        // Re-read after the write rather than reasoning from the pre-write snapshot: this is
        // the chosen resolution to the ready-check race (SPEC_FULL.md §4.3.1/§9). The
        // `status != in_progress` guard below makes StartRound idempotent against the
        // remaining race where two overlapping calls both observe both-ready.
        let mut fields = self.store.get_all_room_fields(room_id).await?;
        let players = store::split_players(fields.get("players").map(String::as_str).unwrap_or(""));
        let status = RoomStatus::parse(fields.get("status").map(String::as_str).unwrap_or("waiting"));

        let mut game_just_started = false;
        if players.len() == 2 && status != RoomStatus::InProgress {
            let all_ready = players.iter().all(|pid| {
                fields
                    .get(&format!("readyStatus.{pid}"))
                    .map(|s| BoolFlag::decode(s))
                    .unwrap_or(false)
            });
            if all_ready {
                self.start_round(room_id, &players).await?;
                fields = self.store.get_all_room_fields(room_id).await?;
                game_just_started = true;
                tracing::info!(room_id, "round started");
            }
        }

        let room = store::reconstruct_room(room_id, &fields)
            .ok_or_else(|| CoreError::Storage("room vanished during player_ready".to_string()))?;
        Ok(PlayerReadyResult {
            updated_room: room,
            game_just_started,
            player_id_ready: user_id.to_string(),
            is_player_now_ready: is_ready,
            room_removed_from_list: game_just_started,
        })
    }

    async fn start_round(&self, room_id: &str, players: &[String]) -> CoreResult<()> {
        self.store.set_room_field(room_id, "status", RoomStatus::InProgress.as_str()).await?;
        self.store.set_room_field(room_id, "turn", &players[0]).await?;

        let mut deck = card::new_shuffled_deck();
        for pid in players {
            let hand: Vec<Card> = (0..2)
                .map(|_| deck.pop().expect("a fresh four-deck shoe always has enough cards for the opening deal"))
                .collect();
            let score = card::score_hand(&hand);
            self.store
                .set_room_field(room_id, &format!("hands.{pid}"), &card::serialize_hand(&hand))
                .await?;
            self.store
                .set_room_field(room_id, &format!("scores.{pid}"), &score.to_string())
                .await?;
        }
        self.store
            .set_room_field(room_id, "deck", &card::serialize_deck(&deck))
            .await?;
        Ok(())
    }

    async fn load_in_progress_room(&self, room_id: &str, user_id: &str) -> CoreResult<crate::model::Room> {
        let fields = self.store.get_all_room_fields(room_id).await?;
        if fields.is_empty() {
            return Err(CoreError::RoomNotFound);
        }
        let room = store::reconstruct_room(room_id, &fields)
            .ok_or_else(|| CoreError::Storage("room fields corrupt".to_string()))?;
        if room.status != RoomStatus::InProgress {
            return Err(CoreError::GameNotInProgress);
        }
        if room.turn != user_id {
            return Err(CoreError::NotYourTurn);
        }
        Ok(room)
    }

    pub async fn hit(&self, user_id: &str, room_id: &str) -> CoreResult<RoundOutcome> {
        let room = self.load_in_progress_room(room_id, user_id).await?;
        let opponent = room
            .opponent_of(user_id)
            .ok_or_else(|| CoreError::Storage("room does not have exactly two players".to_string()))?
            .clone();
        let this_player = room.player(user_id).unwrap().clone();

        let mut deck = room.deck.clone();
        let dealt = deck
            .pop()
            .ok_or_else(|| CoreError::Storage("deck exhausted mid-round".to_string()))?;
        let mut hand = this_player.hand.clone();
        hand.push(dealt.clone());
        let new_score = card::score_hand(&hand);

        self.store
            .set_room_field(room_id, &format!("hands.{user_id}"), &card::serialize_hand(&hand))
            .await?;
        self.store
            .set_room_field(room_id, &format!("scores.{user_id}"), &new_score.to_string())
            .await?;
        self.store
            .set_room_field(room_id, "deck", &card::serialize_deck(&deck))
            .await?;

        if new_score > 21 {
            let mut final_scores = HashMap::new();
            final_scores.insert(user_id.to_string(), new_score);
            final_scores.insert(opponent.id.clone(), opponent.score);
            let mut final_hands = HashMap::new();
            final_hands.insert(user_id.to_string(), hand.clone());
            final_hands.insert(opponent.id.clone(), opponent.hand.clone());

            let end_data = GameEndData {
                winner: opponent.id.clone(),
                loser: user_id.to_string(),
                final_scores,
                final_hands,
            };
            self.end_round(room_id, room.bet, &room.player_ids(), &end_data).await?;
            tracing::info!(room_id, %user_id, "player busted");

            Ok(RoundOutcome {
                room_id: room_id.to_string(),
                player_id: user_id.to_string(),
                dealt_card: Some(dealt),
                new_score,
                is_busted: true,
                game_ended: true,
                next_turn_player_id: None,
                game_end_data: Some(end_data),
            })
        } else {
            self.store.set_room_field(room_id, "turn", &opponent.id).await?;
            Ok(RoundOutcome {
                room_id: room_id.to_string(),
                player_id: user_id.to_string(),
                dealt_card: Some(dealt),
                new_score,
                is_busted: false,
                game_ended: false,
                next_turn_player_id: Some(opponent.id),
                game_end_data: None,
            })
        }
    }

    pub async fn stand(&self, user_id: &str, room_id: &str) -> CoreResult<RoundOutcome> {
        let room = self.load_in_progress_room(room_id, user_id).await?;
        let opponent = room
            .opponent_of(user_id)
            .ok_or_else(|| CoreError::Storage("room does not have exactly two players".to_string()))?
            .clone();
        let this_player = room.player(user_id).unwrap().clone();

        self.store
            .set_room_field(room_id, &format!("stood.{user_id}"), BoolFlag::encode(true))
            .await?;

        let opponent_busted = opponent.score > 21;
        if opponent.stood || opponent_busted {
            let this_busted = this_player.score > 21;
            let (winner, loser) = if this_busted {
                (opponent.id.clone(), user_id.to_string())
            } else if opponent_busted {
                (user_id.to_string(), opponent.id.clone())
            } else if this_player.score > opponent.score {
                (user_id.to_string(), opponent.id.clone())
            } else if opponent.score > this_player.score {
                (opponent.id.clone(), user_id.to_string())
            } else {
                ("0".to_string(), "0".to_string())
            };

            let mut final_scores = HashMap::new();
            final_scores.insert(user_id.to_string(), this_player.score);
            final_scores.insert(opponent.id.clone(), opponent.score);
            let mut final_hands = HashMap::new();
            final_hands.insert(user_id.to_string(), this_player.hand.clone());
            final_hands.insert(opponent.id.clone(), opponent.hand.clone());

            let end_data = GameEndData {
                winner,
                loser,
                final_scores,
                final_hands,
            };
            self.end_round(room_id, room.bet, &room.player_ids(), &end_data).await?;
            tracing::info!(room_id, winner = %end_data.winner, "round ended on stand");

            Ok(RoundOutcome {
                room_id: room_id.to_string(),
                player_id: user_id.to_string(),
                dealt_card: None,
                new_score: this_player.score,
                is_busted: this_busted,
                game_ended: true,
                next_turn_player_id: None,
                game_end_data: Some(end_data),
            })
        } else {
            self.store.set_room_field(room_id, "turn", &opponent.id).await?;
            Ok(RoundOutcome {
                room_id: room_id.to_string(),
                player_id: user_id.to_string(),
                dealt_card: None,
                new_score: this_player.score,
                is_busted: false,
                game_ended: false,
                next_turn_player_id: Some(opponent.id),
                game_end_data: None,
            })
        }
    }

    /// Settlement procedure run at the end of every round: balance transfer, event
    /// publication, then room reset. Grounded on `internal/usecase/game.go`'s
    /// `_endGameProcessing`.
    async fn end_round(
        &self,
        room_id: &str,
        bet: i64,
        players: &[String],
        end: &GameEndData,
    ) -> CoreResult<()> {
        let settleable =
            !end.winner.is_empty() && end.winner != "0" && !end.loser.is_empty() && end.loser != "0" && bet > 0;
        if settleable {
            if let Err(e) = self.balance.subtract_balance(&end.loser, bet).await {
                tracing::error!(room_id, loser = %end.loser, error = %e, "failed to debit loser balance");
            }
            if let Err(e) = self.balance.add_balance(&end.winner, bet).await {
                tracing::error!(room_id, winner = %end.winner, error = %e, "failed to credit winner balance");
            }
        }

        let event = GameResultEvent::from_outcome(room_id, bet, end, chrono::Utc::now().to_rfc3339());
        if let Err(e) = self.event_bus.publish_game_result(&event).await {
            tracing::error!(room_id, error = %e, "failed to publish game_result event");
        }

        self.store.set_room_field(room_id, "status", RoomStatus::Waiting.as_str()).await?;
        self.store.set_room_field(room_id, "turn", "").await?;
        self.store.set_room_field(room_id, "deck", "").await?;
        for pid in players {
            self.store.reset_player_state(room_id, pid).await?;
        }
        Ok(())
    }

    /// The hard failure path: a session dropped while in a room. Safe to call more than once
    /// for the same `(user_id, room_id)` pair. Grounded on
    /// `internal/usecase/game.go`'s `HandlePlayerDisconnect`.
    pub async fn handle_player_disconnect(&self, user_id: &str, room_id: &str) -> CoreResult<DisconnectOutcome> {
        let fields = self.store.get_all_room_fields(room_id).await?;
        if fields.is_empty() {
            return Ok(DisconnectOutcome {
                is_room_deleted: true,
                room_removed_from_list: true,
                game_ended: false,
                game_end_data: None,
                remaining_players: Vec::new(),
            });
        }

        let room = store::reconstruct_room(room_id, &fields)
            .ok_or_else(|| CoreError::Storage("room fields corrupt".to_string()))?;
        if !room.players.iter().any(|p| p.id == user_id) {
            // Race: the player already left (or a previous disconnect already handled them).
            return Ok(DisconnectOutcome {
                is_room_deleted: false,
                room_removed_from_list: false,
                game_ended: false,
                game_end_data: None,
                remaining_players: room.player_ids(),
            });
        }

        let was_in_progress = room.status == RoomStatus::InProgress;
        let was_two_player = room.players.len() == 2;
        let remaining: Vec<String> = room.player_ids().into_iter().filter(|id| id != user_id).collect();

        self.store
            .update_player_list(room_id, &store::join_players(&remaining))
            .await?;
        self.store.delete_player_specific_fields(room_id, user_id).await?;

        if was_two_player && was_in_progress {
            let disconnected = room.player(user_id).unwrap().clone();
            let remainer = room.opponent_of(user_id).unwrap().clone();

            let mut final_scores = HashMap::new();
            final_scores.insert(disconnected.id.clone(), disconnected.score);
            final_scores.insert(remainer.id.clone(), remainer.score);
            let mut final_hands = HashMap::new();
            final_hands.insert(disconnected.id.clone(), disconnected.hand.clone());
            final_hands.insert(remainer.id.clone(), remainer.hand.clone());

            let end_data = GameEndData {
                winner: remainer.id.clone(),
                loser: disconnected.id.clone(),
                final_scores,
                final_hands,
            };
            self.end_round(room_id, room.bet, &room.player_ids(), &end_data).await?;
            tracing::info!(room_id, %user_id, "disconnect ended round, remaining player wins by default");

            return Ok(DisconnectOutcome {
                is_room_deleted: false,
                room_removed_from_list: false,
                game_ended: true,
                game_end_data: Some(end_data),
                remaining_players: vec![remainer.id],
            });
        }

        if remaining.is_empty() {
            self.store.delete_room(room_id).await?;
            tracing::info!(room_id, "room deleted after disconnect: no players remain");
            return Ok(DisconnectOutcome {
                is_room_deleted: true,
                room_removed_from_list: true,
                game_ended: false,
                game_end_data: None,
                remaining_players: Vec::new(),
            });
        }

        if remaining.len() == 1 && !was_in_progress {
            self.store.reset_player_state(room_id, &remaining[0]).await?;
            self.store.set_room_field(room_id, "status", RoomStatus::Waiting.as_str()).await?;
            return Ok(DisconnectOutcome {
                is_room_deleted: false,
                room_removed_from_list: true,
                game_ended: false,
                game_end_data: None,
                remaining_players: remaining,
            });
        }

        Ok(DisconnectOutcome {
            is_room_deleted: false,
            room_removed_from_list: false,
            game_ended: false,
            game_end_data: None,
            remaining_players: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRoomStore;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct NoopBalance {
        calls: Mutex<Vec<(String, i64, bool)>>,
    }

    #[async_trait]
    impl BalanceRatingClient for NoopBalance {
        async fn get_balance(&self, _user_id: &str) -> CoreResult<i64> {
            Ok(1000)
        }
        async fn add_balance(&self, user_id: &str, delta: i64) -> CoreResult<()> {
            self.calls.lock().unwrap().push((user_id.to_string(), delta, true));
            Ok(())
        }
        async fn subtract_balance(&self, user_id: &str, delta: i64) -> CoreResult<()> {
            self.calls.lock().unwrap().push((user_id.to_string(), delta, false));
            Ok(())
        }
        async fn get_rating(&self, _user_id: &str) -> CoreResult<i64> {
            Ok(1000)
        }
    }

    struct NoopBus;
    #[async_trait]
    impl EventBus for NoopBus {
        async fn publish_game_result(&self, _event: &GameResultEvent) -> CoreResult<()> {
            Ok(())
        }
    }

    async fn new_two_player_room(store: &Arc<dyn RoomStore>, bet: i64) -> String {
        use crate::model::{Player, Room};
        let room_id = "room-1".to_string();
        let room = Room {
            id: room_id.clone(),
            status: RoomStatus::Waiting,
            bet,
            players: vec![Player::new("a"), Player::new("b")],
            turn: String::new(),
            deck: Vec::new(),
        };
        store.save_room(&room).await.unwrap();
        room_id
    }

    fn service(store: Arc<dyn RoomStore>) -> GameService {
        GameService::new(
            store,
            Arc::new(NoopBalance { calls: Mutex::new(Vec::new()) }),
            Arc::new(NoopBus),
        )
    }

    #[tokio::test]
    async fn ready_up_both_players_starts_round() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let room_id = new_two_player_room(&store, 100).await;
        let svc = service(store.clone());

        svc.player_ready("a", &room_id, true).await.unwrap();
        let result = svc.player_ready("b", &room_id, true).await.unwrap();

        assert!(result.game_just_started);
        assert_eq!(result.updated_room.status, RoomStatus::InProgress);
        assert_eq!(result.updated_room.turn, "a");
        for player in &result.updated_room.players {
            assert_eq!(player.hand.len(), 2);
        }
    }

    #[tokio::test]
    async fn start_round_is_idempotent_under_duplicate_ready_signals() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let room_id = new_two_player_room(&store, 100).await;
        let svc = service(store.clone());

        svc.player_ready("a", &room_id, true).await.unwrap();
        svc.player_ready("b", &room_id, true).await.unwrap();
        let hand_before = store
            .get_all_room_fields(&room_id)
            .await
            .unwrap()
            .get("hands.a")
            .cloned();

        // A duplicate ready signal observed after the round already started must not re-deal.
        let result = svc.player_ready("a", &room_id, true).await.unwrap();
        assert!(!result.game_just_started);
        let hand_after = store
            .get_all_room_fields(&room_id)
            .await
            .unwrap()
            .get("hands.a")
            .cloned();
        assert_eq!(hand_before, hand_after);
    }

    #[tokio::test]
    async fn hit_rejects_wrong_turn() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let room_id = new_two_player_room(&store, 100).await;
        let svc = service(store.clone());
        svc.player_ready("a", &room_id, true).await.unwrap();
        svc.player_ready("b", &room_id, true).await.unwrap();

        let err = svc.hit("b", &room_id).await.unwrap_err();
        assert!(matches!(err, CoreError::NotYourTurn));
    }

    #[tokio::test]
    async fn bust_ends_round_and_resets_room() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let room_id = new_two_player_room(&store, 100).await;
        let svc = service(store.clone());
        svc.player_ready("a", &room_id, true).await.unwrap();
        svc.player_ready("b", &room_id, true).await.unwrap();

        // Force a guaranteed bust by overwriting the deck and A's hand directly.
        let bust_deck = vec![
            crate::card::parse_card("KS").unwrap(),
            crate::card::parse_card("KD").unwrap(),
        ];
        store
            .set_room_field(&room_id, "deck", &card::serialize_deck(&bust_deck))
            .await
            .unwrap();
        store
            .set_room_field(&room_id, "hands.a", &card::serialize_hand(&[
                crate::card::parse_card("KH").unwrap(),
                crate::card::parse_card("QH").unwrap(),
            ]))
            .await
            .unwrap();
        store.set_room_field(&room_id, "scores.a", "20").await.unwrap();

        let outcome = svc.hit("a", &room_id).await.unwrap();
        assert!(outcome.is_busted);
        assert!(outcome.game_ended);
        assert_eq!(outcome.game_end_data.as_ref().unwrap().winner, "b");

        let fields = store.get_all_room_fields(&room_id).await.unwrap();
        assert_eq!(fields.get("status").unwrap(), "waiting");
        assert_eq!(fields.get("readyStatus.a").unwrap(), "0");
    }

    #[tokio::test]
    async fn disconnect_mid_round_awards_remaining_player_and_is_idempotent() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let room_id = new_two_player_room(&store, 100).await;
        let svc = service(store.clone());
        svc.player_ready("a", &room_id, true).await.unwrap();
        svc.player_ready("b", &room_id, true).await.unwrap();

        let outcome = svc.handle_player_disconnect("a", &room_id).await.unwrap();
        assert!(outcome.game_ended);
        assert_eq!(outcome.game_end_data.as_ref().unwrap().winner, "b");

        // Calling it again for the same pair must be a harmless no-op.
        let second = svc.handle_player_disconnect("a", &room_id).await.unwrap();
        assert!(!second.game_ended);
    }

    #[tokio::test]
    async fn disconnect_of_lone_waiting_player_deletes_room() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        use crate::model::{Player, Room};
        let room_id = "solo-room".to_string();
        let room = Room {
            id: room_id.clone(),
            status: RoomStatus::Waiting,
            bet: 50,
            players: vec![Player::new("a")],
            turn: String::new(),
            deck: Vec::new(),
        };
        store.save_room(&room).await.unwrap();
        let svc = service(store.clone());

        let outcome = svc.handle_player_disconnect("a", &room_id).await.unwrap();
        assert!(outcome.is_room_deleted);
        assert!(store.get_all_room_fields(&room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tie_on_stand_yields_zero_winner_and_loser() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let room_id = new_two_player_room(&store, 100).await;
        let svc = service(store.clone());
        svc.player_ready("a", &room_id, true).await.unwrap();
        svc.player_ready("b", &room_id, true).await.unwrap();

        // Equalize scores so standing ties.
        store.set_room_field(&room_id, "scores.a", "18").await.unwrap();
        store.set_room_field(&room_id, "scores.b", "18").await.unwrap();

        let turn = store.get_all_room_fields(&room_id).await.unwrap().get("turn").cloned().unwrap();
        let other = if turn == "a" { "b" } else { "a" };
        svc.stand(&turn, &room_id).await.unwrap();
        let outcome = svc.stand(other, &room_id).await.unwrap();

        assert!(outcome.game_ended);
        let end = outcome.game_end_data.unwrap();
        assert_eq!(end.winner, "0");
        assert_eq!(end.loser, "0");
    }

    #[allow(dead_code)]
    fn _unused(_h: StdHashMap<String, i64>) {}
}
