//! The message log and its read-state transitions.
//!
//! Ordering within a conversation is total: `(created_at, rowid)`, the
//! rowid being the store-assigned monotonic tie-breaker.  `seen` only
//! ever moves false -> true; both the bulk transition in
//! [`Database::conversation`] and the single transition in
//! [`Database::mark_seen`] are single SQLite transactions.

use chrono::{DateTime, Utc};
use rusqlite::params;

use colloquy_shared::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::users::{parse_timestamp, parse_user_id};

impl Database {
    /// Append a new message to the log.
    ///
    /// Fails with [`StoreError::Validation`] when both text and image are
    /// absent and with [`StoreError::NotFound`] when the receiver does
    /// not resolve to a known user.  Returns the persisted message with
    /// its store-assigned id and timestamp.
    pub fn append_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Message> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && image_url.is_none() {
            return Err(StoreError::Validation(
                "Message must contain text or image".to_string(),
            ));
        }

        if !self.user_exists(receiver_id)? {
            return Err(StoreError::NotFound("Receiver"));
        }

        let message = Message {
            id: MessageId::new(),
            sender_id,
            receiver_id,
            text: text.map(str::to_string),
            image_url: image_url.map(str::to_string),
            seen: false,
            seen_at: None,
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, seen, seen_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.text,
                message.image_url,
                message.created_at.to_rfc3339(),
            ],
        )?;

        Ok(message)
    }

    /// Fetch the full conversation between `requester` and `counterpart`
    /// in ascending creation order.
    ///
    /// Side effect: every message authored by the counterpart that the
    /// requester has not seen is transitioned to seen in the same
    /// transaction -- opening a conversation is the read receipt.  The
    /// returned list is the state as fetched, so newly read messages
    /// still show their pre-receipt `seen: false`.
    pub fn conversation(
        &mut self,
        requester: UserId,
        counterpart: UserId,
    ) -> Result<Vec<Message>> {
        if !self.user_exists(counterpart)? {
            return Err(StoreError::NotFound("User"));
        }

        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        let messages = {
            let mut stmt = tx.prepare(
                "SELECT id, sender_id, receiver_id, text, image_url, seen, seen_at, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt.query_map(
                params![requester.to_string(), counterpart.to_string()],
                row_to_message,
            )?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            messages
        };

        let marked = tx.execute(
            "UPDATE messages SET seen = 1, seen_at = ?3
             WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
            params![
                counterpart.to_string(),
                requester.to_string(),
                now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        if marked > 0 {
            tracing::debug!(
                requester = %requester,
                counterpart = %counterpart,
                marked,
                "conversation fetch marked messages seen"
            );
        }

        Ok(messages)
    }

    /// Explicit read receipt for a single message.
    ///
    /// Only the receiver may mark a message; the transition is
    /// idempotent -- a second call returns the original `seen_at`.
    /// Returns the message in its post-transition state plus whether
    /// this call performed the transition (false on the no-op repeat).
    pub fn mark_seen(&mut self, id: MessageId, requester: UserId) -> Result<(Message, bool)> {
        let tx = self.conn_mut().transaction()?;

        let mut message = tx
            .query_row(
                "SELECT id, sender_id, receiver_id, text, image_url, seen, seen_at, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("Message"),
                other => StoreError::Sqlite(other),
            })?;

        if message.receiver_id != requester {
            return Err(StoreError::Forbidden("Not authorized to mark this message"));
        }

        let transitioned = if message.seen {
            false
        } else {
            let now = Utc::now();
            tx.execute(
                "UPDATE messages SET seen = 1, seen_at = ?2 WHERE id = ?1 AND seen = 0",
                params![id.to_string(), now.to_rfc3339()],
            )?;
            message.seen = true;
            message.seen_at = Some(now);
            true
        };

        tx.commit()?;
        Ok((message, transitioned))
    }

    /// Fetch a single message.
    pub fn message_by_id(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, sender_id, receiver_id, text, image_url, seen, seen_at, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("Message"),
                other => StoreError::Sqlite(other),
            })
    }

    /// Permanently delete a message.  Only the original sender may do
    /// this.  Returns the removed row so the caller can clean up any
    /// attachment and notify the participants.
    pub fn remove_message(&self, id: MessageId, requester: UserId) -> Result<Message> {
        let message = self.message_by_id(id)?;

        if message.sender_id != requester {
            return Err(StoreError::Forbidden(
                "Not authorized to delete this message",
            ));
        }

        self.conn().execute(
            "DELETE FROM messages WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(message)
    }
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let seen: bool = row.get(5)?;
    let seen_at_str: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    let id = MessageId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let seen_at: Option<DateTime<Utc>> = match seen_at_str {
        Some(s) => Some(parse_timestamp(&s, 6)?),
        None => None,
    };

    Ok(Message {
        id,
        sender_id: parse_user_id(&sender_str, 1)?,
        receiver_id: parse_user_id(&receiver_str, 2)?,
        text: row.get(3)?,
        image_url: row.get(4)?,
        seen,
        seen_at,
        created_at: parse_timestamp(&created_at_str, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_pair() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("Alice", "a@example.com", "h", "").unwrap().id;
        let b = db.create_user("Bob", "b@example.com", "h", "").unwrap().id;
        (db, a, b)
    }

    #[test]
    fn append_requires_content() {
        let (db, a, b) = db_with_pair();
        let err = db.append_message(a, b, None, None).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // Whitespace-only text counts as absent.
        let err = db.append_message(a, b, Some("   "), None).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // Image alone is enough.
        db.append_message(a, b, None, Some("/media/x.png")).unwrap();
    }

    #[test]
    fn append_rejects_unknown_receiver() {
        let (db, a, _) = db_with_pair();
        let err = db
            .append_message(a, UserId::new(), Some("hi"), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("Receiver")));
    }

    #[test]
    fn conversation_is_ordered_and_bidirectional() {
        let (mut db, a, b) = db_with_pair();
        let m1 = db.append_message(a, b, Some("one"), None).unwrap();
        let m2 = db.append_message(b, a, Some("two"), None).unwrap();
        let m3 = db.append_message(a, b, Some("three"), None).unwrap();

        let msgs = db.conversation(a, b).unwrap();
        assert_eq!(
            msgs.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id, m3.id]
        );
        for pair in msgs.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn conversation_marks_only_counterpart_messages_seen() {
        let (mut db, a, b) = db_with_pair();
        let from_a = db.append_message(a, b, Some("from a"), None).unwrap();
        let from_b = db.append_message(b, a, Some("from b"), None).unwrap();

        // A opens the conversation: B's message transitions to seen in
        // the store, but the returned snapshot is pre-receipt.
        let msgs = db.conversation(a, b).unwrap();
        assert!(msgs.iter().all(|m| !m.seen));

        let stored_b = db.message_by_id(from_b.id).unwrap();
        assert!(stored_b.seen);
        assert!(stored_b.seen_at.is_some());

        // Until B opens it, A's message stays unseen in the store.
        assert!(!db.message_by_id(from_a.id).unwrap().seen);

        // B's next fetch reflects the earlier receipt on B's message.
        let msgs = db.conversation(b, a).unwrap();
        assert!(msgs.iter().find(|m| m.id == from_b.id).unwrap().seen);
        assert!(!msgs.iter().find(|m| m.id == from_a.id).unwrap().seen);
        assert!(db.message_by_id(from_a.id).unwrap().seen);
    }

    #[test]
    fn conversation_rejects_unknown_counterpart() {
        let (mut db, a, _) = db_with_pair();
        let err = db.conversation(a, UserId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn mark_seen_is_receiver_gated_and_idempotent() {
        let (mut db, a, b) = db_with_pair();
        let msg = db.append_message(a, b, Some("hi"), None).unwrap();

        // The sender may not mark their own message.
        let err = db.mark_seen(msg.id, a).unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let (first, transitioned) = db.mark_seen(msg.id, b).unwrap();
        assert!(first.seen);
        assert!(transitioned);
        let first_at = first.seen_at.unwrap();

        // Second call is a no-op returning the original timestamp.
        let (second, transitioned) = db.mark_seen(msg.id, b).unwrap();
        assert_eq!(second.seen_at, Some(first_at));
        assert!(!transitioned);
    }

    #[test]
    fn mark_seen_unknown_message() {
        let (mut db, a, _) = db_with_pair();
        let err = db.mark_seen(MessageId::new(), a).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("Message")));
    }

    #[test]
    fn remove_is_sender_gated() {
        let (db, a, b) = db_with_pair();
        let msg = db.append_message(a, b, Some("hi"), None).unwrap();

        let err = db.remove_message(msg.id, b).unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let removed = db.remove_message(msg.id, a).unwrap();
        assert_eq!(removed.id, msg.id);
        assert!(matches!(
            db.message_by_id(msg.id).unwrap_err(),
            StoreError::NotFound("Message")
        ));
    }

    #[test]
    fn seen_is_monotonic() {
        let (mut db, a, b) = db_with_pair();
        let msg = db.append_message(a, b, Some("hi"), None).unwrap();
        db.mark_seen(msg.id, b).unwrap();

        // No later fetch observes the flag reset.
        assert!(db.message_by_id(msg.id).unwrap().seen);
        assert!(db.conversation(b, a).unwrap()[0].seen);
        assert!(db.mark_seen(msg.id, b).unwrap().0.seen);
    }
}
