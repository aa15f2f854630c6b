use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::card::{self, Card};
use crate::error::{CoreError, CoreResult};
use crate::model::{Opponent, Player, Room, RoomStatus};

pub const PLAYER_SPECIFIC_BASE_FIELDS: [&str; 5] =
    ["readyStatus", "scores", "hands", "lastAction", "stood"];

/// Encodes/decodes the boolean fields the store keeps as `"0"`/`"1"` strings.
///
/// The reference implementation this was ported from flips this encoding inconsistently
/// (one call site writes `"0"` for `isReady = true`); this is the single place that encodes
/// or decodes the flag, so that bug cannot reappear.
pub struct BoolFlag;

impl BoolFlag {
    pub fn encode(value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    pub fn decode(raw: &str) -> bool {
        raw == "1"
    }
}

fn room_key(room_id: &str) -> String {
    format!("room:{room_id}")
}

fn player_field(base: &str, player_id: &str) -> String {
    format!("{base}.{player_id}")
}

pub fn split_players(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }
    csv.split(',').filter(|p| !p.is_empty()).map(String::from).collect()
}

pub fn join_players(ids: &[String]) -> String {
    ids.join(",")
}

/// Field-addressable storage for room records plus the MMR-scored matchmaking pool.
///
/// Grounded on `internal/adapter/redis/{room,ranked}.go`: each method below corresponds 1:1 to a
/// Redis-backed method there. The concrete implementation here (`InMemoryRoomStore`) keeps the
/// same operation contract and atomicity guarantees without a Redis wire client, per the
/// Non-goals' "no durable persistence required" framing (see SPEC_FULL.md §4.1 implementation note).
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get_all_room_fields(&self, room_id: &str) -> CoreResult<HashMap<String, String>>;
    async fn set_room_field(&self, room_id: &str, field: &str, value: &str) -> CoreResult<()>;
    async fn save_room(&self, room: &Room) -> CoreResult<()>;
    async fn update_player_list(&self, room_id: &str, csv: &str) -> CoreResult<()>;
    async fn add_joining_player(&self, room_id: &str, user_id: &str, csv: &str) -> CoreResult<()>;
    async fn delete_player_specific_fields(&self, room_id: &str, player_id: &str) -> CoreResult<()>;
    async fn reset_player_state(&self, room_id: &str, player_id: &str) -> CoreResult<()>;
    async fn delete_room(&self, room_id: &str) -> CoreResult<()>;

    async fn add_to_pool(&self, user_id: &str, mmr: i64) -> CoreResult<()>;
    async fn remove_from_pool(&self, user_ids: &[String]) -> CoreResult<()>;
    /// MUST be atomic: selects and removes at most one eligible opponent in a single
    /// critical section, or makes no change at all.
    async fn find_opponent(&self, user_id: &str, mmr: i64, range: i64) -> CoreResult<Option<Opponent>>;
}

/// Rebuilds the domain `Room` from a field map, the way `reconstructRoomModel` does in the
/// reference use case.
pub fn reconstruct_room(room_id: &str, fields: &HashMap<String, String>) -> Option<Room> {
    if fields.is_empty() {
        return None;
    }
    let status = RoomStatus::parse(fields.get("status").map(String::as_str).unwrap_or("waiting"));
    let bet = fields
        .get("bet")
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);
    let turn = fields.get("turn").cloned().unwrap_or_default();
    let deck = fields
        .get("deck")
        .map(|s| card::parse_deck(s))
        .unwrap_or_default();
    let player_ids = split_players(fields.get("players").map(String::as_str).unwrap_or(""));

    let players = player_ids
        .into_iter()
        .map(|pid| {
            let ready = fields
                .get(&player_field("readyStatus", &pid))
                .map(|s| BoolFlag::decode(s))
                .unwrap_or(false);
            let score = fields
                .get(&player_field("scores", &pid))
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0);
            let hand = fields
                .get(&player_field("hands", &pid))
                .map(|s| card::parse_hand(s))
                .unwrap_or_default();
            let last_action = fields
                .get(&player_field("lastAction", &pid))
                .cloned()
                .unwrap_or_default();
            let stood = fields
                .get(&player_field("stood", &pid))
                .map(|s| BoolFlag::decode(s))
                .unwrap_or(false);
            Player {
                id: pid,
                is_ready: ready,
                score,
                last_action,
                hand,
                stood,
            }
        })
        .collect();

    Some(Room {
        id: room_id.to_string(),
        status,
        bet,
        players,
        turn,
        deck,
    })
}

struct RoomRecord {
    fields: HashMap<String, String>,
}

pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<String, RoomRecord>>,
    pool: Mutex<Vec<(String, i64)>>,
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        InMemoryRoomStore {
            rooms: RwLock::new(HashMap::new()),
            pool: Mutex::new(Vec::new()),
        }
    }

    fn storage_err(context: &str) -> CoreError {
        CoreError::Storage(context.to_string())
    }
}

fn default_player_fields(player_id: &str) -> [(String, String); 4] {
    [
        (player_field("readyStatus", player_id), BoolFlag::encode(false).to_string()),
        (player_field("scores", player_id), "0".to_string()),
        (player_field("hands", player_id), "nil".to_string()),
        (player_field("lastAction", player_id), "nil".to_string()),
    ]
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn get_all_room_fields(&self, room_id: &str) -> CoreResult<HashMap<String, String>> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .get(room_id)
            .map(|r| r.fields.clone())
            .unwrap_or_default())
    }

    async fn set_room_field(&self, room_id: &str, field: &str, value: &str) -> CoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::storage_err("set_room_field on missing room"))?;
        record.fields.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn save_room(&self, room: &Room) -> CoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("roomID".to_string(), room.id.clone());
        fields.insert("status".to_string(), room.status.as_str().to_string());
        fields.insert("bet".to_string(), room.bet.to_string());
        fields.insert("turn".to_string(), room.turn.clone());
        fields.insert("deck".to_string(), card::serialize_deck(&room.deck));

        let player_ids = room.player_ids();
        for p in &room.players {
            fields.insert(player_field("readyStatus", &p.id), BoolFlag::encode(p.is_ready).to_string());
            fields.insert(player_field("scores", &p.id), p.score.to_string());
            fields.insert(player_field("hands", &p.id), card::serialize_hand(&p.hand));
            fields.insert(player_field("lastAction", &p.id), p.last_action.clone());
            fields.insert(player_field("stood", &p.id), BoolFlag::encode(p.stood).to_string());
        }
        fields.insert("players".to_string(), join_players(&player_ids));

        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id.clone(), RoomRecord { fields });
        Ok(())
    }

    async fn update_player_list(&self, room_id: &str, csv: &str) -> CoreResult<()> {
        self.set_room_field(room_id, "players", csv).await
    }

    async fn add_joining_player(&self, room_id: &str, user_id: &str, csv: &str) -> CoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::storage_err("add_joining_player on missing room"))?;
        record.fields.insert("players".to_string(), csv.to_string());
        for (field, value) in default_player_fields(user_id) {
            record.fields.insert(field, value);
        }
        Ok(())
    }

    async fn delete_player_specific_fields(&self, room_id: &str, player_id: &str) -> CoreResult<()> {
        let mut rooms = self.rooms.write().await;
        if let Some(record) = rooms.get_mut(room_id) {
            for base in PLAYER_SPECIFIC_BASE_FIELDS {
                record.fields.remove(&player_field(base, player_id));
            }
        }
        Ok(())
    }

    async fn reset_player_state(&self, room_id: &str, player_id: &str) -> CoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::storage_err("reset_player_state on missing room"))?;
        record.fields.insert(player_field("scores", player_id), "0".to_string());
        record
            .fields
            .insert(player_field("readyStatus", player_id), BoolFlag::encode(false).to_string());
        record.fields.insert(player_field("hands", player_id), "nil".to_string());
        record.fields.insert(player_field("lastAction", player_id), "nil".to_string());
        record
            .fields
            .insert(player_field("stood", player_id), BoolFlag::encode(false).to_string());
        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> CoreResult<()> {
        let mut rooms = self.rooms.write().await;
        rooms.remove(room_id);
        Ok(())
    }

    async fn add_to_pool(&self, user_id: &str, mmr: i64) -> CoreResult<()> {
        let mut pool = self.pool.lock().unwrap();
        pool.retain(|(id, _)| id != user_id);
        pool.push((user_id.to_string(), mmr));
        Ok(())
    }

    async fn remove_from_pool(&self, user_ids: &[String]) -> CoreResult<()> {
        let mut pool = self.pool.lock().unwrap();
        pool.retain(|(id, _)| !user_ids.contains(id));
        Ok(())
    }

    async fn find_opponent(&self, user_id: &str, mmr: i64, range: i64) -> CoreResult<Option<Opponent>> {
        let mut pool = self.pool.lock().unwrap();
        let mut candidates: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, (id, m))| id != user_id && (m - mmr).abs() <= range)
            .map(|(idx, _)| idx)
            .collect();
        candidates.sort_by_key(|&idx| pool[idx].1);
        let Some(&idx) = candidates.first() else {
            return Ok(None);
        };
        let (id, found_mmr) = pool.remove(idx);
        Ok(Some(Opponent { id, mmr: found_mmr }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_opponent_is_atomic_and_respects_range() {
        let store = InMemoryRoomStore::new();
        store.add_to_pool("u1", 1200).await.unwrap();
        store.add_to_pool("u2", 1450).await.unwrap();
        store.add_to_pool("u3", 1250).await.unwrap();

        let found = store.find_opponent("u1", 1200, 100).await.unwrap();
        assert_eq!(found.unwrap().id, "u3");

        // u3 must no longer be in the pool.
        let again = store.find_opponent("u1", 1200, 100).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn find_opponent_never_returns_self() {
        let store = InMemoryRoomStore::new();
        store.add_to_pool("solo", 1000).await.unwrap();
        let found = store.find_opponent("solo", 1000, 500).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn save_then_reconstruct_round_trips() {
        let store = InMemoryRoomStore::new();
        let room = Room {
            id: "r1".into(),
            status: RoomStatus::Waiting,
            bet: 100,
            players: vec![Player::new("p1")],
            turn: String::new(),
            deck: Vec::new(),
        };
        store.save_room(&room).await.unwrap();
        let fields = store.get_all_room_fields("r1").await.unwrap();
        let rebuilt = reconstruct_room("r1", &fields).unwrap();
        assert_eq!(rebuilt.bet, 100);
        assert_eq!(rebuilt.player_ids(), vec!["p1".to_string()]);
    }
}
