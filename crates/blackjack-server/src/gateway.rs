//! Upgrades an HTTP request to a WebSocket session. Authenticates first; the session is only
//! constructed and registered once a valid user ID has been resolved from the bearer token.

use std::collections::HashMap;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::session::{self, MAX_MESSAGE_SIZE};
use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let query_token = params.get("token").map(String::as_str);
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());

    let Some(token) = blackjack_core::auth::extract_token(query_token, auth_header) else {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    };

    let user_id = match state.services.auth.verify(&token) {
        Ok(id) => id,
        Err(_) => return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
    };

    let hub = state.hub.clone();
    let services = state.services.clone();
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| session::run(socket, user_id, hub, services))
}
