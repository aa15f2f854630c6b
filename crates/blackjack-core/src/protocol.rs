use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Inbound frame from a client session: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom { bet: i64 },
    JoinRoom { room_id: String, bet: i64 },
    LeaveRoom,
    Ready { is_ready: bool },
    Hit,
    Stand,
    FindRankedMatch,
    Ping,
}

/// Outbound frame to a client session: `{"type": "...", "content": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated(String),
    UpdateList {
        action: String,
        #[serde(rename = "roomID")]
        room_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        players: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bet: Option<i64>,
    },
    RoomJoined {
        players: Vec<String>,
    },
    RoomLeft {
        #[serde(rename = "roomID")]
        room_id: String,
        players: Vec<String>,
        message: String,
    },
    PlayerLeft {
        #[serde(rename = "roomID")]
        room_id: String,
        players: Vec<String>,
        message: String,
    },
    LeftRoomSuccessfully(String),
    GameWaiting {
        msg: String,
    },
    PlayerReady {
        #[serde(rename = "playerReady")]
        player_ready: String,
    },
    GameStarted {
        hands: HashMap<String, Vec<String>>,
        scores: HashMap<String, i64>,
        turn: String,
        status: String,
        bet: i64,
    },
    Hit {
        #[serde(rename = "forPlayer")]
        for_player: String,
        card: String,
        score: i64,
    },
    Busted {
        #[serde(rename = "forPlayer")]
        for_player: String,
        msg: String,
    },
    Stand {
        #[serde(rename = "forPlayer")]
        for_player: String,
        scores: HashMap<String, i64>,
    },
    Turn {
        turn: String,
    },
    GameEnd {
        #[serde(rename = "roomID")]
        room_id: String,
        winner: String,
        scores: HashMap<String, i64>,
        hands: HashMap<String, Vec<String>>,
    },
    Warning {
        #[serde(skip_serializing_if = "Option::is_none", rename = "roomID")]
        room_id: Option<String>,
        msg: String,
    },
    Error {
        error_type: String,
        message: String,
    },
    RankedSearchStarted(String),
    MatchFound {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Pong,
}

/// Validates a user-supplied room id (non-empty, bounded length, ASCII alphanumeric or hyphen).
/// Room ids in this system are minted server-side as UUIDs, but the same shape check guards
/// any client-supplied `room_id` payload before it is used as a storage key.
pub fn validate_room_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("room id must not be empty".to_string());
    }
    if id.len() > 64 {
        return Err("room id is too long".to_string());
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("room id must be alphanumeric".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_room_ids() {
        assert!(validate_room_id("a1b2c3").is_ok());
        assert!(validate_room_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn invalid_room_ids() {
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("has a space").is_err());
        assert!(validate_room_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn client_message_round_trips() {
        let msg = ClientMessage::Ready { is_ready: true };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"ready","payload":{"is_ready":true}}"#);
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn server_message_newtype_variant_serializes_plain_content() {
        let msg = ServerMessage::RoomCreated("abc-123".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"room_created","content":"abc-123"}"#);
    }

    #[test]
    fn unit_client_variant_has_no_payload_key() {
        let json = serde_json::to_string(&ClientMessage::Hit).unwrap();
        assert_eq!(json, r#"{"type":"hit"}"#);
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClientMessage::Hit);
    }
}
