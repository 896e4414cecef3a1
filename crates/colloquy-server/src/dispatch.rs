//! Best-effort delivery of message events to connected participants.
//!
//! The dispatcher never fails: durability lives in the store, so an
//! offline participant simply receives nothing and catches up on the
//! next conversation fetch.  There is no retry, acknowledgment, or
//! queueing, and no ordering guarantee relative to concurrent fetches;
//! clients merge pushed messages by id.

use colloquy_shared::protocol::{SeenPayload, ServerEvent};
use colloquy_store::Message;

use crate::presence::PresenceRegistry;

#[derive(Clone)]
pub struct Dispatcher {
    presence: PresenceRegistry,
}

impl Dispatcher {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    /// Push a freshly stored message to both participants' sessions.
    pub async fn message_created(&self, message: &Message) {
        let event = ServerEvent::NewMessage(message.clone().into_payload());
        self.push_to(message.receiver_id, &event).await;
        self.push_to(message.sender_id, &event).await;
    }

    /// Notify the sender that their message was read.
    pub async fn message_seen(&self, message: &Message) {
        let Some(seen_at) = message.seen_at else {
            return;
        };
        let event = ServerEvent::MessageSeen(SeenPayload {
            message_id: message.id,
            seen_at,
        });
        self.push_to(message.sender_id, &event).await;
    }

    /// Notify both participants that a message was deleted.
    pub async fn message_deleted(&self, message: &Message) {
        let event = ServerEvent::MessageDeleted(message.id);
        self.push_to(message.sender_id, &event).await;
        self.push_to(message.receiver_id, &event).await;
    }

    async fn push_to(&self, user_id: colloquy_shared::UserId, event: &ServerEvent) {
        if let Some(handle) = self.presence.lookup(user_id).await {
            handle.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws;
    use chrono::Utc;
    use tokio::sync::mpsc;

    use colloquy_shared::{MessageId, UserId};

    use crate::presence::SessionHandle;

    fn message(sender: UserId, receiver: UserId) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            text: Some("hi".into()),
            image_url: None,
            seen: false,
            seen_at: None,
            created_at: Utc::now(),
        }
    }

    fn recv_event(rx: &mut mpsc::UnboundedReceiver<ws::Message>) -> ServerEvent {
        let ws::Message::Text(json) = rx.try_recv().expect("expected a pushed frame") else {
            panic!("expected text frame");
        };
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn new_message_reaches_online_receiver() {
        let presence = PresenceRegistry::new();
        let dispatcher = Dispatcher::new(presence.clone());
        let (alice, bob) = (UserId::new(), UserId::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.register(bob, SessionHandle::new(tx)).await;

        dispatcher.message_created(&message(alice, bob)).await;

        let ServerEvent::NewMessage(payload) = recv_event(&mut rx) else {
            panic!("expected newMessage");
        };
        assert_eq!(payload.text.as_deref(), Some("hi"));
        assert!(!payload.seen);
    }

    #[tokio::test]
    async fn offline_receiver_gets_nothing_and_nothing_fails() {
        let presence = PresenceRegistry::new();
        let dispatcher = Dispatcher::new(presence.clone());
        let (alice, bob) = (UserId::new(), UserId::new());

        // Nobody online: at-most-once means zero here.
        dispatcher.message_created(&message(alice, bob)).await;

        // Sender online, receiver offline: only the sender echo goes out.
        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.register(alice, SessionHandle::new(tx)).await;
        dispatcher.message_created(&message(alice, bob)).await;

        assert!(matches!(recv_event(&mut rx), ServerEvent::NewMessage(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn seen_event_targets_the_sender() {
        let presence = PresenceRegistry::new();
        let dispatcher = Dispatcher::new(presence.clone());
        let (alice, bob) = (UserId::new(), UserId::new());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        presence.register(alice, SessionHandle::new(tx_a)).await;
        presence.register(bob, SessionHandle::new(tx_b)).await;

        let mut msg = message(alice, bob);
        msg.seen = true;
        msg.seen_at = Some(Utc::now());
        dispatcher.message_seen(&msg).await;

        let ServerEvent::MessageSeen(payload) = recv_event(&mut rx_a) else {
            panic!("expected messageSeen");
        };
        assert_eq!(payload.message_id, msg.id);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn deleted_event_targets_both_participants() {
        let presence = PresenceRegistry::new();
        let dispatcher = Dispatcher::new(presence.clone());
        let (alice, bob) = (UserId::new(), UserId::new());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        presence.register(alice, SessionHandle::new(tx_a)).await;
        presence.register(bob, SessionHandle::new(tx_b)).await;

        let msg = message(alice, bob);
        dispatcher.message_deleted(&msg).await;

        for rx in [&mut rx_a, &mut rx_b] {
            assert!(matches!(
                recv_event(rx),
                ServerEvent::MessageDeleted(id) if id == msg.id
            ));
        }
    }
}
