//! The live-session registry.

use crate::session::Session;
use otcore::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// All live sessions in the process, for rebinding, the idle sweep,
/// and load assessment.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    minted: AtomicU64,
}

impl SessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            minted: AtomicU64::new(0),
        }
    }

    /// Mint a process-unique session id.
    pub fn mint_session_id(&self) -> SessionId {
        let n = self.minted.fetch_add(1, Ordering::Relaxed);
        SessionId::new(format!("sess-{n:08x}"))
    }

    /// Register a session.
    pub async fn insert(&self, session: Arc<Session>) {
        self.sessions
            .lock()
            .await
            .insert(session.session_id().clone(), session);
    }

    /// Look up a live session.
    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Forget a session.
    pub async fn remove(&self, session_id: &SessionId) {
        self.sessions.lock().await.remove(session_id);
    }

    /// How many sessions are live.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Every live session, for the sweep.
    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.values().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
