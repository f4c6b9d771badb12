//! Session id → live connection map.
//!
//! Registration is last-writer-wins: a reconnect with the same session id
//! replaces the previous handle without any collision check. Teardown uses
//! [`SessionRegistry::release`], which only removes the entry if it still
//! belongs to the connection being torn down, so a stale connection cannot
//! evict its replacement.

use std::sync::Arc;

use chatwire_core::{ConnectionId, SessionId};
use dashmap::DashMap;
use tracing::debug;

use super::connection::ConnectionHandle;

/// Concurrent map from session id to the connection serving it.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<ConnectionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` under `session_id`, returning the handle it replaced.
    pub fn register(
        &self,
        session_id: SessionId,
        handle: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        debug!(session_id = %session_id, connection_id = %handle.id(), "session registered");
        let previous = self.sessions.insert(session_id, handle);
        if let Some(old) = &previous {
            debug!(connection_id = %old.id(), "replaced previous connection");
        }
        previous
    }

    /// Live handle for `session_id`.
    pub fn lookup(&self, session_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the mapping for `session_id`. No-op when absent.
    pub fn unregister(&self, session_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    /// Remove the mapping only if it points at `connection_id`.
    pub fn release(&self, session_id: &str, connection_id: &ConnectionId) -> bool {
        let removed = self
            .sessions
            .remove_if(session_id, |_, handle| handle.id() == connection_id)
            .is_some();
        debug!(session_id, connection_id = %connection_id, removed, "session released");
        removed
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Registered handles whose socket is still open.
    pub fn connected_count(&self) -> usize {
        self.sessions.iter().filter(|entry| entry.value().is_connected()).count()
    }

    /// Registered session ids, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn handle(session: &str) -> (Arc<ConnectionHandle>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(4);
        (Arc::new(ConnectionHandle::new(session.into(), tx)), rx)
    }

    #[test]
    fn register_and_lookup() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle("s1");
        assert!(registry.register("s1".into(), Arc::clone(&h)).is_none());
        let found = registry.lookup("s1").unwrap();
        assert_eq!(found.id(), h.id());
        assert!(registry.lookup("s2").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reconnect_overwrites_with_newest() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = handle("s");
        let (second, _rx2) = handle("s");
        let _ = registry.register("s".into(), Arc::clone(&first));
        let replaced = registry.register("s".into(), Arc::clone(&second)).unwrap();
        assert_eq!(replaced.id(), first.id());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("s").unwrap().id(), second.id());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle("s");
        let _ = registry.register("s".into(), h);
        assert!(registry.unregister("s").is_some());
        assert!(registry.unregister("s").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn release_leaves_newer_connection() {
        let registry = SessionRegistry::new();
        let (old, _rx1) = handle("s");
        let (new, _rx2) = handle("s");
        let _ = registry.register("s".into(), Arc::clone(&old));
        let _ = registry.register("s".into(), Arc::clone(&new));
        assert!(!registry.release("s", old.id()));
        assert_eq!(registry.lookup("s").unwrap().id(), new.id());
        assert!(registry.release("s", new.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn connected_count_skips_closed() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = handle("a");
        let (b, rx_b) = handle("b");
        let _ = registry.register("a".into(), a);
        let _ = registry.register("b".into(), b);
        drop(rx_b);
        assert_eq!(registry.connected_count(), 1);
        let ids: Vec<String> = registry.session_ids().into_iter().map(SessionId::into_inner).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn concurrent_registration() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(1);
                let session = format!("s{}", i % 4);
                let h = Arc::new(ConnectionHandle::new(session.as_str().into(), tx));
                let _ = registry.register(session.into(), h);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len(), 4);
    }
}
