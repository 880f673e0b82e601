//! Session registry implementation
//!
//! The central store tracking every live viewer session. Registration happens
//! before any fallible setup step of a session, so a failure path always has
//! a record to unwind.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::error::RegistryError;
use crate::session::Session;

/// Central registry for all viewer sessions
///
/// Thread-safe via `RwLock`. Lock order is always registry outward, session
/// inward; the map guard is never held across a subprocess call.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its id.
    ///
    /// Duplicate ids are rejected rather than overwritten, so an id can never
    /// silently change hands while its previous owner still runs teardown.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write().await;

        match sessions.entry(session.id().to_owned()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateSession(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::info!(session_id = %entry.key(), "Session registered");
                entry.insert(session);
                Ok(())
            }
        }
    }

    /// Remove a session and terminate its capture process.
    ///
    /// Returns the removed record, or `None` when the id was absent. Safe to
    /// call repeatedly; the process shutdown runs at most once because the
    /// record leaves the map on the first call. The map guard is dropped
    /// before the shutdown await.
    pub async fn unregister(&self, id: &str) -> Option<Arc<Session>> {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id)
        };

        if let Some(ref session) = removed {
            session.shutdown().await;
            tracing::info!(session_id = %id, "Session unregistered");
        }

        removed
    }

    /// Apply a bounded mutation to a registered session.
    pub async fn update<F>(&self, id: &str, mutator: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&Session),
    {
        let sessions = self.sessions.read().await;

        match sessions.get(id) {
            Some(session) => {
                mutator(session.as_ref());
                Ok(())
            }
            None => Err(RegistryError::SessionNotFound(id.to_owned())),
        }
    }

    /// Point-in-time snapshot of all registered sessions.
    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
