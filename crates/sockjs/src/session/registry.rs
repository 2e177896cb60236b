//! Maps session identifiers to live sessions, scoped to one endpoint.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use crate::{connection::SessionHandler, session::Session};

/// Live sessions of a single endpoint, keyed by session ID.
///
/// Operations on different IDs do not contend beyond the map lock itself; a
/// session removes itself from the registry when it reaches
/// [`SessionState::Closed`](crate::session::SessionState::Closed), so a
/// successful lookup always yields a session that is still accepting
/// traffic.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session that is still alive.
    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Resolve the session for a handshake request, creating it in
    /// `Connecting` state if this is the first time the ID is seen.
    pub(crate) fn get_or_create(
        self: &Arc<Self>,
        id: &str,
        handler: &Arc<dyn SessionHandler>,
        disconnect_delay: Duration,
    ) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(id) {
            return Arc::clone(existing);
        }
        let session = Session::new(
            id.to_string(),
            Arc::downgrade(self),
            Arc::clone(handler),
            disconnect_delay,
        );
        sessions.insert(id.to_string(), Arc::clone(&session));
        session
    }

    /// Drop a session that reached its terminal state.
    pub(crate) fn evict(&self, id: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "session evicted");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
