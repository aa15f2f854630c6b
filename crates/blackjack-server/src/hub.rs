//! Session registry and fan-out. Grounded on the reference implementation's
//! `pkg/ws.Hub`: a single map of live clients protected by one lock, with
//! broadcast helpers that evict a client whose outbound queue is full rather
//! than block the caller.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::dispatcher;
use crate::session::{Session, SessionId};
use crate::Services;

pub struct Hub {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    by_user: RwLock<HashMap<String, SessionId>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Hub {
            sessions: RwLock::new(HashMap::new()),
            by_user: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, session: Arc<Session>) {
        let mut by_user = self.by_user.write().await;
        let mut sessions = self.sessions.write().await;
        by_user.insert(session.user_id.clone(), session.id);
        tracing::info!(session_id = session.id, user_id = %session.user_id, "session registered");
        sessions.insert(session.id, session);
    }

    /// Idempotent: unregistering a session id that is no longer present is a no-op.
    pub async fn unregister(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(&id)?;
        let mut by_user = self.by_user.write().await;
        if by_user.get(&session.user_id) == Some(&id) {
            by_user.remove(&session.user_id);
        }
        tracing::info!(session_id = id, user_id = %session.user_id, "session unregistered");
        Some(session)
    }

    /// Unregisters a session and, if it was still present, runs disconnect cleanup for it.
    /// This is the single path by which a session's destruction (read-loop exit, or eviction
    /// from a full outbound queue discovered during a broadcast) triggers `OnDisconnect`.
    pub async fn unregister_and_notify(self: &Arc<Self>, id: SessionId, services: &Arc<Services>) {
        if let Some(session) = self.unregister(id).await {
            dispatcher::handle_disconnect(session, self.clone(), services.clone()).await;
        }
    }

    pub async fn broadcast_to_all(self: &Arc<Self>, bytes: &Bytes, services: &Arc<Services>) {
        let mut evict = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for session in sessions.values() {
                if !session.try_send(bytes.clone()) {
                    evict.push(session.id);
                }
            }
        }
        for id in evict {
            self.unregister_and_notify(id, services).await;
        }
    }

    pub async fn broadcast_to_room(self: &Arc<Self>, room_id: &str, bytes: &Bytes, services: &Arc<Services>) {
        let mut evict = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for session in sessions.values() {
                if session.room_id.read().await.as_deref() == Some(room_id) {
                    if !session.try_send(bytes.clone()) {
                        evict.push(session.id);
                    }
                }
            }
        }
        for id in evict {
            self.unregister_and_notify(id, services).await;
        }
    }

    pub async fn send_to_client(self: &Arc<Self>, session: &Arc<Session>, bytes: Bytes, services: &Arc<Services>) {
        if !session.try_send(bytes) {
            self.unregister_and_notify(session.id, services).await;
        }
    }

    pub async fn get_client_by_user_id(&self, user_id: &str) -> Option<Arc<Session>> {
        let by_user = self.by_user.read().await;
        let id = *by_user.get(user_id)?;
        self.sessions.read().await.get(&id).cloned()
    }
}
