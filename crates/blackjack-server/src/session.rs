//! A single connected client and its read/write pumps. Timing constants and the
//! pump split are grounded on `pkg/ws/client.go`'s `Client.ReadPump`/`WritePump`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};

use crate::dispatcher;
use crate::hub::Hub;
use crate::Services;

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Maximum size of an inbound frame from the peer.
pub const MAX_MESSAGE_SIZE: usize = 512;
/// Outbound queue depth per session; a session this far behind is dropped.
const SEND_QUEUE_CAPACITY: usize = 64;

/// A registered client. `room_id` is mutated by the dispatcher as the player joins, leaves,
/// or is matched into rooms over the session's lifetime.
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub room_id: RwLock<Option<String>>,
    tx: mpsc::Sender<Bytes>,
}

impl Session {
    fn new(id: SessionId, user_id: String, tx: mpsc::Sender<Bytes>) -> Arc<Self> {
        Arc::new(Session {
            id,
            user_id,
            room_id: RwLock::new(None),
            tx,
        })
    }

    /// Enqueues a frame for the write pump. Returns `false` if the outbound queue is full or
    /// the pump has already exited, signalling the caller to unregister this session.
    pub fn try_send(&self, bytes: Bytes) -> bool {
        self.tx.try_send(bytes).is_ok()
    }
}

/// Drives one upgraded WebSocket connection end-to-end: registers the session, spawns the
/// write pump, then reads frames until the peer disconnects or the read deadline lapses.
///
/// Timeouts are sourced from `CoreConfig` (`WS_READ_TIMEOUT_SECS`/`WS_WRITE_TIMEOUT_SECS`/
/// `WS_IDLE_TIMEOUT_SECS`, see SPEC_FULL.md §6.5) rather than hardcoded, but default to the
/// same values as the reference implementation's `pongWait`/`writeWait`. `ws_idle_timeout`
/// wraps the whole read loop as an outer backstop above the per-frame read deadline, mirroring
/// the reference implementation's separate (and, for an upgraded connection, largely redundant)
/// `http.Server.IdleTimeout`.
pub async fn run(socket: WebSocket, user_id: String, hub: Arc<Hub>, services: Arc<Services>) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);

    let id = next_session_id();
    let session = Session::new(id, user_id, tx);
    hub.register(session.clone()).await;

    let read_timeout = services.ws_read_timeout;
    let write_timeout = services.ws_write_timeout;
    let idle_timeout = services.ws_idle_timeout;
    let ping_period = (read_timeout * 9) / 10;

    let write_handle = tokio::spawn(write_pump(ws_sink, rx, write_timeout, ping_period));

    let read_loop = async {
        loop {
            match tokio::time::timeout(read_timeout, ws_stream.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    match serde_json::from_str::<blackjack_core::protocol::ClientMessage>(&text) {
                        Ok(msg) => {
                            let session = session.clone();
                            let hub = hub.clone();
                            let services = services.clone();
                            tokio::spawn(async move {
                                dispatcher::dispatch(msg, session, hub, services).await;
                            });
                        }
                        Err(e) => {
                            dispatcher::send_validation_error(&session, &format!("invalid message: {e}"));
                        }
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Err(_) => break,
                Ok(Some(Err(_))) => break,
                Ok(Some(Ok(_))) => continue,
            }
        }
    };
    let _ = tokio::time::timeout(idle_timeout, read_loop).await;

    write_handle.abort();
    hub.unregister_and_notify(id, &services).await;
}

async fn write_pump(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
    ping_period: Duration,
) {
    let mut ticker = tokio::time::interval(ping_period);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            maybe_bytes = rx.recv() => {
                let Some(bytes) = maybe_bytes else {
                    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
                    break;
                };
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if tokio::time::timeout(write_timeout, sink.send(Message::Text(text.into()))).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if tokio::time::timeout(write_timeout, sink.send(Message::Ping(Bytes::new()))).await.is_err() {
                    break;
                }
            }
        }
    }
}
