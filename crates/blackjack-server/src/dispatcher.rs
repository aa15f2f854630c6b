//! Frame dispatch: translates one inbound `ClientMessage` into Room/Game/Matchmaking
//! service calls and the resulting outbound frames. Each call runs in its own task
//! (spawned by the session's read loop) so a slow handler never blocks the next frame.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use blackjack_core::error::CoreError;
use blackjack_core::protocol::{ClientMessage, ServerMessage};

use crate::hub::Hub;
use crate::session::Session;
use crate::Services;

fn to_bytes(msg: &ServerMessage) -> Bytes {
    Bytes::from(serde_json::to_vec(msg).expect("ServerMessage always serializes"))
}

fn send(session: &Arc<Session>, msg: ServerMessage) {
    session.try_send(to_bytes(&msg));
}

pub fn send_validation_error(session: &Arc<Session>, message: &str) {
    send(
        session,
        ServerMessage::Error {
            error_type: "validation_error".to_string(),
            message: message.to_string(),
        },
    );
}

fn send_error(session: &Arc<Session>, err: &CoreError) {
    let frame = if matches!(err, CoreError::NotYourTurn) {
        ServerMessage::Warning {
            room_id: None,
            msg: err.to_string(),
        }
    } else {
        ServerMessage::Error {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
        }
    };
    send(session, frame);
}

fn hands_to_wire(hands: &HashMap<String, Vec<blackjack_core::card::Card>>) -> HashMap<String, Vec<String>> {
    hands
        .iter()
        .map(|(id, cards)| (id.clone(), cards.iter().map(|c| c.to_string()).collect()))
        .collect()
}

pub async fn dispatch(msg: ClientMessage, session: Arc<Session>, hub: Arc<Hub>, services: Arc<Services>) {
    match msg {
        ClientMessage::CreateRoom { bet } => handle_create_room(bet, &session, &hub, &services).await,
        ClientMessage::JoinRoom { room_id, bet } => {
            handle_join_room(&room_id, bet, &session, &hub, &services).await
        }
        ClientMessage::LeaveRoom => handle_leave_room(&session, &hub, &services).await,
        ClientMessage::Ready { is_ready } => handle_ready(is_ready, &session, &hub, &services).await,
        ClientMessage::Hit => handle_hit(&session, &hub, &services).await,
        ClientMessage::Stand => handle_stand(&session, &hub, &services).await,
        ClientMessage::FindRankedMatch => handle_find_ranked_match(&session, &hub, &services).await,
        ClientMessage::Ping => send(&session, ServerMessage::Pong),
    }
}

async fn current_room(session: &Arc<Session>) -> Option<String> {
    session.room_id.read().await.clone()
}

async fn handle_create_room(bet: i64, session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    match services.rooms.create_room(&session.user_id, bet).await {
        Ok(room) => {
            *session.room_id.write().await = Some(room.id.clone());
            send(session, ServerMessage::RoomCreated(room.id.clone()));
            hub.broadcast_to_all(
                &to_bytes(&ServerMessage::UpdateList {
                    action: "add".to_string(),
                    room_id: room.id.clone(),
                    status: Some(room.status.as_str().to_string()),
                    players: Some(room.player_ids()),
                    bet: Some(room.bet),
                }),
                services,
            )
            .await;
        }
        Err(e) => send_error(session, &e),
    }
}

async fn handle_join_room(room_id: &str, bet: i64, session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    match services.rooms.join_room(&session.user_id, room_id, bet).await {
        Ok(room) => {
            *session.room_id.write().await = Some(room.id.clone());
            hub.broadcast_to_room(
                &room.id,
                &to_bytes(&ServerMessage::RoomJoined {
                    players: room.player_ids(),
                }),
                services,
            )
            .await;
            hub.broadcast_to_all(
                &to_bytes(&ServerMessage::UpdateList {
                    action: "update".to_string(),
                    room_id: room.id.clone(),
                    status: Some(room.status.as_str().to_string()),
                    players: Some(room.player_ids()),
                    bet: Some(room.bet),
                }),
                services,
            )
            .await;
            hub.broadcast_to_room(
                &room.id,
                &to_bytes(&ServerMessage::GameWaiting {
                    msg: "waiting for both players to ready up".to_string(),
                }),
                services,
            )
            .await;
        }
        Err(e) => send_error(session, &e),
    }
}

async fn handle_leave_room(session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    let Some(room_id) = current_room(session).await else {
        send_validation_error(session, "not currently in a room");
        return;
    };

    match services.rooms.leave_room(&session.user_id, &room_id).await {
        Ok((room_opt, was_deleted)) => {
            *session.room_id.write().await = None;
            send(session, ServerMessage::LeftRoomSuccessfully(room_id.clone()));

            if was_deleted {
                hub.broadcast_to_all(
                    &to_bytes(&ServerMessage::UpdateList {
                        action: "remove".to_string(),
                        room_id: room_id.clone(),
                        status: None,
                        players: None,
                        bet: None,
                    }),
                    services,
                )
                .await;
            } else if let Some(room) = room_opt {
                hub.broadcast_to_room(
                    &room.id,
                    &to_bytes(&ServerMessage::RoomLeft {
                        room_id: room.id.clone(),
                        players: room.player_ids(),
                        message: format!("{} left the room", session.user_id),
                    }),
                    services,
                )
                .await;
                hub.broadcast_to_all(
                    &to_bytes(&ServerMessage::UpdateList {
                        action: "update".to_string(),
                        room_id: room.id.clone(),
                        status: Some(room.status.as_str().to_string()),
                        players: Some(room.player_ids()),
                        bet: Some(room.bet),
                    }),
                    services,
                )
                .await;
            }
        }
        // Already gone from the room: treat as already-satisfied rather than an error.
        Err(CoreError::RoomNotFound) | Err(CoreError::PlayerNotInRoom) => {}
        Err(e) => send_error(session, &e),
    }
}

async fn handle_ready(is_ready: bool, session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    let Some(room_id) = current_room(session).await else {
        send_validation_error(session, "not currently in a room");
        return;
    };

    match services.games.player_ready(&session.user_id, &room_id, is_ready).await {
        Ok(result) => {
            if result.game_just_started {
                let room = &result.updated_room;
                let hands: HashMap<String, Vec<String>> = room
                    .players
                    .iter()
                    .map(|p| (p.id.clone(), p.hand.iter().map(|c| c.to_string()).collect()))
                    .collect();
                let scores: HashMap<String, i64> =
                    room.players.iter().map(|p| (p.id.clone(), p.score)).collect();
                hub.broadcast_to_room(
                    &room.id,
                    &to_bytes(&ServerMessage::GameStarted {
                        hands,
                        scores,
                        turn: room.turn.clone(),
                        status: room.status.as_str().to_string(),
                        bet: room.bet,
                    }),
                    services,
                )
                .await;
                hub.broadcast_to_all(
                    &to_bytes(&ServerMessage::UpdateList {
                        action: "remove".to_string(),
                        room_id: room.id.clone(),
                        status: None,
                        players: None,
                        bet: None,
                    }),
                    services,
                )
                .await;
            } else {
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::PlayerReady {
                        player_ready: result.player_id_ready,
                    }),
                    services,
                )
                .await;
            }
        }
        Err(e) => send_error(session, &e),
    }
}

async fn handle_hit(session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    let Some(room_id) = current_room(session).await else {
        send_validation_error(session, "not currently in a room");
        return;
    };

    match services.games.hit(&session.user_id, &room_id).await {
        Ok(outcome) => {
            hub.broadcast_to_room(
                &room_id,
                &to_bytes(&ServerMessage::Hit {
                    for_player: outcome.player_id.clone(),
                    card: outcome.dealt_card.as_ref().map(|c| c.to_string()).unwrap_or_default(),
                    score: outcome.new_score,
                }),
                services,
            )
            .await;

            if outcome.is_busted {
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::Busted {
                        for_player: outcome.player_id.clone(),
                        msg: "busted".to_string(),
                    }),
                    services,
                )
                .await;
            }

            if let Some(end) = outcome.game_end_data {
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::GameEnd {
                        room_id: room_id.clone(),
                        winner: end.winner.clone(),
                        scores: end.final_scores.clone(),
                        hands: hands_to_wire(&end.final_hands),
                    }),
                    services,
                )
                .await;
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::GameWaiting {
                        msg: "round over, ready up for another".to_string(),
                    }),
                    services,
                )
                .await;
            } else if let Some(next) = outcome.next_turn_player_id {
                hub.broadcast_to_room(&room_id, &to_bytes(&ServerMessage::Turn { turn: next }), services)
                    .await;
            }
        }
        Err(e) => send_error(session, &e),
    }
}

async fn handle_stand(session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    let Some(room_id) = current_room(session).await else {
        send_validation_error(session, "not currently in a room");
        return;
    };

    match services.games.stand(&session.user_id, &room_id).await {
        Ok(outcome) => {
            let mut scores = HashMap::new();
            scores.insert(outcome.player_id.clone(), outcome.new_score);
            if let Some(end) = &outcome.game_end_data {
                scores.extend(end.final_scores.clone());
            }
            hub.broadcast_to_room(
                &room_id,
                &to_bytes(&ServerMessage::Stand {
                    for_player: outcome.player_id.clone(),
                    scores,
                }),
                services,
            )
            .await;

            if let Some(end) = outcome.game_end_data {
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::GameEnd {
                        room_id: room_id.clone(),
                        winner: end.winner.clone(),
                        scores: end.final_scores.clone(),
                        hands: hands_to_wire(&end.final_hands),
                    }),
                    services,
                )
                .await;
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::GameWaiting {
                        msg: "round over, ready up for another".to_string(),
                    }),
                    services,
                )
                .await;
            } else if let Some(next) = outcome.next_turn_player_id {
                hub.broadcast_to_room(&room_id, &to_bytes(&ServerMessage::Turn { turn: next }), services)
                    .await;
            }
        }
        Err(e) => send_error(session, &e),
    }
}

async fn handle_find_ranked_match(session: &Arc<Session>, hub: &Arc<Hub>, services: &Arc<Services>) {
    send(session, ServerMessage::RankedSearchStarted(session.user_id.clone()));

    match services.matchmaking.find_match(&session.user_id).await {
        Ok(Some(m)) => {
            for player_id in &m.players {
                if let Some(peer) = hub.get_client_by_user_id(player_id).await {
                    *peer.room_id.write().await = Some(m.room_id.clone());
                    hub.send_to_client(
                        &peer,
                        to_bytes(&ServerMessage::MatchFound {
                            room_id: m.room_id.clone(),
                        }),
                        services,
                    )
                    .await;
                }
            }
        }
        Ok(None) => {}
        Err(e) => send_error(session, &e),
    }
}

/// Invoked once, after a session has been unregistered, to settle any room it was part of.
pub async fn handle_disconnect(session: Arc<Session>, hub: Arc<Hub>, services: Arc<Services>) {
    let Some(room_id) = session.room_id.read().await.clone() else {
        return;
    };

    match services.games.handle_player_disconnect(&session.user_id, &room_id).await {
        Ok(outcome) => {
            if outcome.is_room_deleted {
                if outcome.room_removed_from_list {
                    hub.broadcast_to_all(
                        &to_bytes(&ServerMessage::UpdateList {
                            action: "remove".to_string(),
                            room_id: room_id.clone(),
                            status: None,
                            players: None,
                            bet: None,
                        }),
                        &services,
                    )
                    .await;
                }
                return;
            }

            if outcome.game_ended {
                if let Some(end) = &outcome.game_end_data {
                    hub.broadcast_to_room(
                        &room_id,
                        &to_bytes(&ServerMessage::GameEnd {
                            room_id: room_id.clone(),
                            winner: end.winner.clone(),
                            scores: end.final_scores.clone(),
                            hands: hands_to_wire(&end.final_hands),
                        }),
                        &services,
                    )
                    .await;
                }
                // Same EndRound-completion convention as handle_hit/handle_stand: a game_end is
                // always followed by game_waiting, never player_left, for the room that's left.
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::GameWaiting {
                        msg: "round over, ready up for another".to_string(),
                    }),
                    &services,
                )
                .await;
            } else {
                hub.broadcast_to_room(
                    &room_id,
                    &to_bytes(&ServerMessage::PlayerLeft {
                        room_id: room_id.clone(),
                        players: outcome.remaining_players.clone(),
                        message: format!("{} disconnected", session.user_id),
                    }),
                    &services,
                )
                .await;
            }

            hub.broadcast_to_all(
                &to_bytes(&ServerMessage::UpdateList {
                    action: if outcome.room_removed_from_list { "remove" } else { "update" }.to_string(),
                    room_id: room_id.clone(),
                    status: None,
                    players: Some(outcome.remaining_players),
                    bet: None,
                }),
                &services,
            )
            .await;
        }
        Err(e) => {
            tracing::error!(room_id, user_id = %session.user_id, error = %e, "failed to process disconnect cleanup");
        }
    }
}
