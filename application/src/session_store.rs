use domain::session::{Message, Role, Session};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

pub type SharedSession = Arc<AsyncMutex<Session>>;

/// Process-lifetime conversation memory keyed by session id.
///
/// The map lock is held only for lookup/insert; each session has its own
/// async lock, so holders of one session never block another.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, session_id: &str) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Session::new(session_id.to_string()))))
            .clone()
    }

    pub async fn append(&self, session_id: &str, role: Role, text: &str) {
        let session = self.get_or_create(session_id);
        session.lock().await.add_message(role, text);
    }

    /// Snapshot of the transcript; empty for an unknown session, which is
    /// not created.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned();
        match session {
            Some(session) => session.lock().await.history.clone(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
