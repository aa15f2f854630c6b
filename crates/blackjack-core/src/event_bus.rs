use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::GameEndData;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerResult {
    pub player_id: String,
    pub final_score: i64,
    pub final_hand: Vec<String>,
}

/// `game_result` event payload, published once per completed round. Field names and shape are
/// grounded on `internal/adapter/nats/producer/dto/game.go`'s `FromResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResultEvent {
    pub room_id: String,
    pub winner_id: String,
    pub loser_id: String,
    pub bet: i64,
    pub created_at: String,
    pub players: Vec<PlayerResult>,
}

impl GameResultEvent {
    pub fn from_outcome(room_id: &str, bet: i64, end: &GameEndData, created_at: String) -> Self {
        let players = end
            .final_scores
            .iter()
            .map(|(player_id, score)| PlayerResult {
                player_id: player_id.clone(),
                final_score: *score,
                final_hand: end
                    .final_hands
                    .get(player_id)
                    .map(|h| h.iter().map(|c| c.to_string()).collect())
                    .unwrap_or_default(),
            })
            .collect();
        GameResultEvent {
            room_id: room_id.to_string(),
            winner_id: end.winner.clone(),
            loser_id: end.loser.clone(),
            bet,
            created_at,
            players,
        }
    }
}

/// Publish-only client to the result bus. Grounded on
/// `internal/adapter/nats/producer/game.go`'s `GameEvent.PushGameEnd`: fire-and-forget,
/// failures are logged by the caller rather than rolling back the round settlement
/// (see SPEC_FULL.md §6.3, §7 UpstreamError).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish_game_result(&self, event: &GameResultEvent) -> CoreResult<()>;
}

pub struct NatsEventBus {
    client: async_nats::Client,
    subject: String,
}

impl NatsEventBus {
    pub async fn connect(hosts: &str, subject: impl Into<String>) -> CoreResult<Self> {
        let client = async_nats::connect(hosts)
            .await
            .map_err(|e| CoreError::Upstream(format!("nats connect: {e}")))?;
        Ok(NatsEventBus {
            client,
            subject: subject.into(),
        })
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish_game_result(&self, event: &GameResultEvent) -> CoreResult<()> {
        let body = serde_json::to_vec(event).map_err(|e| CoreError::Upstream(e.to_string()))?;
        // Length-delimited binary framing: a 4-byte big-endian length prefix followed by the
        // serialized payload, in place of the original's protobuf encoding (SPEC_FULL.md §6.3).
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);

        self.client
            .publish(self.subject.clone(), framed.into())
            .await
            .map_err(|e| CoreError::Upstream(format!("nats publish: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn event_is_built_from_game_end_data() {
        let mut scores = HashMap::new();
        scores.insert("1".to_string(), 20);
        scores.insert("2".to_string(), 18);
        let end = GameEndData {
            winner: "1".to_string(),
            loser: "2".to_string(),
            final_scores: scores,
            final_hands: HashMap::new(),
        };
        let event = GameResultEvent::from_outcome("room-1", 100, &end, "2026-07-28T00:00:00Z".to_string());
        assert_eq!(event.winner_id, "1");
        assert_eq!(event.players.len(), 2);
    }
}
