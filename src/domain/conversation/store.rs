use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::ConversationSession;

/// Handle to one session; holding its lock serializes queries on that session
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// Sessions keyed by id, each behind its own lock.
///
/// The map lock is only held to look up or insert a handle, never across a
/// query, so queries on different sessions do not contend.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `session_id`, creating an empty session on first use
    pub async fn handle(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return handle.clone();
        }

        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationSession::new(session_id))))
            .clone()
    }

    /// Copy of a session's current state
    pub async fn snapshot(&self, session_id: &str) -> Option<ConversationSession> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Drop a session's messages; returns false if it does not exist
    pub async fn clear(&self, session_id: &str) -> bool {
        let Some(handle) = self.sessions.read().await.get(session_id).cloned() else {
            return false;
        };

        handle.lock().await.clear();
        true
    }

    /// Forget a session entirely, including its pinned selection
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
