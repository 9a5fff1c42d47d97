use log::{debug, warn};
use std::collections::HashMap;

use crate::session_management::session::Session;

/// Table of live sessions keyed by session identifier.
///
/// The registry is owned by the router and mutated from its task only, so it needs no
/// locking. Removal is idempotent and a removed identifier is unreachable afterwards.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `session` under its identifier, replacing any entry with the same identifier.
    pub fn add(&mut self, session: Session) {
        if let Some(previous) = self.sessions.insert(session.id.clone(), session) {
            warn!("[{}] session identifier reused, previous entry replaced", previous.id);
        }
    }

    /// Removes and returns the entry, or `None` if it was not registered.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let removed = self.sessions.remove(id);
        if removed.is_none() {
            debug!("[{}] remove ignored, session not registered", id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Snapshot of the current entries. Later mutations of the registry do not affect it.
    pub fn all(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
