use std::collections::HashMap;

use crate::card::Card;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    InProgress,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::InProgress => "in_progress",
        }
    }

    pub fn parse(s: &str) -> RoomStatus {
        match s {
            "in_progress" => RoomStatus::InProgress,
            _ => RoomStatus::Waiting,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub is_ready: bool,
    pub score: i64,
    pub last_action: String,
    pub hand: Vec<Card>,
    pub stood: bool,
}

impl Player {
    pub fn new(id: impl Into<String>) -> Self {
        Player {
            id: id.into(),
            is_ready: false,
            score: 0,
            last_action: String::new(),
            hand: Vec::new(),
            stood: false,
        }
    }
}

/// Full in-memory reconstruction of a room record, assembled from the field-addressable store.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub status: RoomStatus,
    pub bet: i64,
    pub players: Vec<Player>,
    pub turn: String,
    pub deck: Vec<Card>,
}

impl Room {
    pub fn player_ids(&self) -> Vec<String> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn opponent_of(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id != id)
    }
}

#[derive(Debug, Clone)]
pub struct PlayerReadyResult {
    pub updated_room: Room,
    pub game_just_started: bool,
    pub player_id_ready: String,
    pub is_player_now_ready: bool,
    pub room_removed_from_list: bool,
}

/// Per-round settlement summary, produced at the end of `Hit`/`Stand`/disconnect-induced endings.
#[derive(Debug, Clone, Default)]
pub struct GameEndData {
    pub winner: String,
    pub loser: String,
    pub final_scores: HashMap<String, i64>,
    pub final_hands: HashMap<String, Vec<Card>>,
}

/// Outcome of `Hit` or `Stand`.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub room_id: String,
    pub player_id: String,
    pub dealt_card: Option<Card>,
    pub new_score: i64,
    pub is_busted: bool,
    pub game_ended: bool,
    pub next_turn_player_id: Option<String>,
    pub game_end_data: Option<GameEndData>,
}

#[derive(Debug, Clone)]
pub struct DisconnectOutcome {
    pub is_room_deleted: bool,
    pub room_removed_from_list: bool,
    pub game_ended: bool,
    pub game_end_data: Option<GameEndData>,
    pub remaining_players: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Opponent {
    pub id: String,
    pub mmr: i64,
}

#[derive(Debug, Clone)]
pub struct Match {
    pub room_id: String,
    pub players: [String; 2],
}
