//! The presence registry: the authoritative in-memory map from user id
//! to live session handle.
//!
//! All mutations go through the mutex, so a concurrent `snapshot`
//! observes either the pre- or post-mutation state, never a partial one.
//! One handle per user: a reconnect replaces the prior entry (last
//! connection wins), and `unregister` only evicts when the session id
//! still matches, so a stale disconnect cannot remove a newer session.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use colloquy_shared::protocol::ServerEvent;
use colloquy_shared::UserId;

/// An opaque reference to one live WebSocket connection, usable to push
/// events to that client.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<ws::Message>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ws::Message>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Best-effort push: serialize the event and hand it to the session's
    /// writer task.  Failure means the session is going away; it is
    /// logged and swallowed.
    pub fn push(&self, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                return;
            }
        };

        if self.tx.send(ws::Message::Text(json)).is_err() {
            tracing::debug!(session = %self.session_id, "Push to closed session dropped");
        }
    }
}

/// Shared registry of online users and live sessions.
///
/// Two maps under one lock: `online` is the user -> session association
/// behind `lookup`/`snapshot`, while `sessions` holds every live
/// connection including anonymous ones, so broadcasts reach sessions
/// that never identified themselves.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    online: HashMap<UserId, SessionHandle>,
    sessions: HashMap<Uuid, SessionHandle>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a live session for broadcasts.  Every connection attaches,
    /// identified or not.
    pub async fn attach(&self, handle: SessionHandle) {
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(handle.session_id, handle);
    }

    /// Stop tracking a session once its socket is gone.
    pub async fn detach(&self, session_id: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(&session_id);
    }

    /// Associate a session with a user, replacing any prior entry.
    pub async fn register(&self, user_id: UserId, handle: SessionHandle) {
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.online.insert(user_id, handle) {
            tracing::debug!(
                user = %user_id,
                replaced = %old.session_id,
                "reconnect replaced existing session"
            );
        }
    }

    /// Remove the user's entry, but only if it still belongs to the
    /// session being torn down.  Returns whether an entry was removed.
    pub async fn unregister(&self, user_id: UserId, session_id: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.online.get(&user_id) {
            Some(current) if current.session_id == session_id => {
                inner.online.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// The session handle for a user, if they are online.
    pub async fn lookup(&self, user_id: UserId) -> Option<SessionHandle> {
        self.inner.lock().await.online.get(&user_id).cloned()
    }

    /// The full set of currently online users.
    pub async fn snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.inner.lock().await.online.keys().copied().collect();
        users.sort();
        users
    }

    /// Push an event to every live session, anonymous ones included.
    pub async fn broadcast(&self, event: &ServerEvent) {
        let handles: Vec<SessionHandle> =
            self.inner.lock().await.sessions.values().cloned().collect();
        for handle in handles {
            handle.push(event);
        }
    }

    /// Broadcast the current online-user snapshot to every live session.
    /// Called on every presence change.
    pub async fn broadcast_snapshot(&self) {
        let snapshot = self.snapshot().await;
        tracing::debug!(online = snapshot.len(), "broadcasting presence snapshot");
        self.broadcast(&ServerEvent::GetOnlineUsers(snapshot)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (SessionHandle, mpsc::UnboundedReceiver<ws::Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn snapshot_tracks_registered_sessions() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let bob = UserId::new();

        registry.register(alice, handle().0).await;
        registry.register(bob, handle().0).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&alice));
        assert!(snapshot.contains(&bob));
    }

    #[tokio::test]
    async fn reconnect_replaces_without_duplicating() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();

        let (first, _rx1) = handle();
        let (second, mut rx2) = handle();
        let second_id = second.session_id();

        registry.register(alice, first).await;
        registry.register(alice, second).await;

        assert_eq!(registry.snapshot().await.len(), 1);

        // The live handle is the second one.
        let current = registry.lookup(alice).await.unwrap();
        assert_eq!(current.session_id(), second_id);
        current.push(&ServerEvent::MessageDeleted(colloquy_shared::MessageId::new()));
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_evict_newer_session() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();

        let (first, _rx1) = handle();
        let first_id = first.session_id();
        let (second, _rx2) = handle();

        registry.register(alice, first).await;
        registry.register(alice, second).await;

        // The first connection's teardown fires after the reconnect.
        assert!(!registry.unregister(alice, first_id).await);
        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn unregister_matching_session_removes_entry() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();

        let (h, _rx) = handle();
        let id = h.session_id();
        registry.register(alice, h).await;

        assert!(registry.unregister(alice, id).await);
        assert!(registry.snapshot().await.is_empty());
        assert!(registry.lookup(alice).await.is_none());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let registry = PresenceRegistry::new();
        let (h1, mut rx1) = handle();
        let (h2, mut rx2) = handle();

        registry.attach(h1.clone()).await;
        registry.attach(h2.clone()).await;
        registry.register(UserId::new(), h1).await;
        registry.register(UserId::new(), h2).await;
        registry.broadcast_snapshot().await;

        for rx in [&mut rx1, &mut rx2] {
            let ws::Message::Text(json) = rx.recv().await.unwrap() else {
                panic!("expected text frame");
            };
            let event: ServerEvent = serde_json::from_str(&json).unwrap();
            assert!(matches!(event, ServerEvent::GetOnlineUsers(users) if users.len() == 2));
        }
    }

    #[tokio::test]
    async fn anonymous_sessions_receive_broadcasts() {
        let registry = PresenceRegistry::new();

        // A session that never identified itself still gets the snapshot.
        let (anon, mut anon_rx) = handle();
        let anon_id = anon.session_id();
        registry.attach(anon).await;

        let (named, _rx) = handle();
        let alice = UserId::new();
        registry.attach(named.clone()).await;
        registry.register(alice, named).await;
        registry.broadcast_snapshot().await;

        let ws::Message::Text(json) = anon_rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let event: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, ServerEvent::GetOnlineUsers(vec![alice]));

        // Detached sessions drop out of the fan-out set.
        registry.detach(anon_id).await;
        registry.broadcast_snapshot().await;
        assert!(anon_rx.try_recv().is_err());
    }
}
