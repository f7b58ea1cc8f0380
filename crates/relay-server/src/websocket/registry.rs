//! Live-session registry shared by the connection tasks and the liveness
//! monitor.

use dashmap::DashMap;
use relay_core::ids::ConnectionId;
use tracing::debug;

use crate::session::Session;

/// Sessions indexed by connection id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted session.
    pub fn add(&self, session: Session) {
        let _ = self.sessions.insert(session.id().clone(), session);
    }

    /// Stop tracking a session. Returns it if it was present.
    pub fn remove(&self, id: &ConnectionId) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Look up a session by connection id.
    pub fn get(&self, id: &ConnectionId) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Ask every live session to close. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let sessions = self.sessions();
        for session in &sessions {
            session.connection().close();
        }
        debug!(count = sessions.len(), "closing all sessions");
        sessions.len()
    }
}
