//! Live sessions and their lifecycle state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use camrelay_core::{SessionId, SessionState};

#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub opened_at: DateTime<Utc>,
}

/// Sessions between accept and teardown.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted session in `Init`.
    pub fn register(&self, id: &SessionId) {
        let _ = self.sessions.insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                state: SessionState::Init,
                opened_at: Utc::now(),
            },
        );
    }

    /// Move a session forward. Returns false for unknown sessions.
    pub fn transition(&self, id: &SessionId, state: SessionState) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut info) => {
                info.state = state;
                true
            }
            None => false,
        }
    }

    /// Drop a session once it is `Closed`.
    pub fn finish(&self, id: &SessionId) -> Option<SessionInfo> {
        self.sessions.remove(id).map(|(_, mut info)| {
            info.state = SessionState::Closed;
            info
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self.sessions.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.register(&id);
        assert_eq!(registry.list()[0].state, SessionState::Init);
        assert!(registry.transition(&id, SessionState::Active));
        assert!(registry.transition(&id, SessionState::Closing));
        assert_eq!(registry.list()[0].state, SessionState::Closing);
        assert_eq!(registry.len(), 1);

        let info = registry.finish(&id).unwrap();
        assert_eq!(info.state, SessionState::Closed);
        assert!(registry.is_empty());
        assert!(!registry.transition(&id, SessionState::Active));
    }

    #[test]
    fn unknown_session_transition_is_rejected() {
        let registry = SessionRegistry::new();
        assert!(!registry.transition(&SessionId::new(), SessionState::Active));
        assert!(registry.finish(&SessionId::new()).is_none());
    }

    #[test]
    fn list_is_ordered() {
        let registry = SessionRegistry::new();
        let ids: Vec<SessionId> = (0..5).map(|_| SessionId::new()).collect();
        for id in &ids {
            registry.register(id);
        }
        let listed: Vec<SessionId> = registry.list().into_iter().map(|i| i.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn concurrent_registration() {
        use std::sync::Arc;
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        r.register(&SessionId::new());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }
}
