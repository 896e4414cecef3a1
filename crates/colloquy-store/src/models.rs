//! Domain model structs persisted in SQLite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use colloquy_shared::protocol::{MessagePayload, UserPayload};
use colloquy_shared::{MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.  `password_hash` stays server-side; wire
/// conversion via [`User::into_payload`] strips it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub bio: String,
    /// Reference into the media store (`/media/<file>`), if set.
    pub avatar_url: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Strip the credential and convert to the wire shape.
    pub fn into_payload(self) -> UserPayload {
        UserPayload {
            id: self.id,
            full_name: self.full_name,
            email: self.email,
            bio: self.bio,
            profile_pic: self.avatar_url,
            last_seen: self.last_seen,
            created_at: self.created_at,
        }
    }
}

/// Fields a user may change on their own profile.  `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
///
/// Core fields are immutable after insert; only the read-state pair
/// (`seen`, `seen_at`) ever changes, and only false -> true.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    /// Reference into the media store, if the message carries an image.
    pub image_url: Option<String>,
    pub seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Convert to the wire shape pushed to clients.
    pub fn into_payload(self) -> MessagePayload {
        MessagePayload {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            text: self.text,
            image: self.image_url,
            seen: self.seen,
            seen_at: self.seen_at,
            created_at: self.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Unseen summary
// ---------------------------------------------------------------------------

/// Derived per-counterpart aggregation: how many of their messages the
/// requesting user has not seen, plus the most recent message exchanged
/// in either direction.  Recomputed on every call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterpartSummary {
    pub counterpart_id: UserId,
    pub unseen_count: u64,
    pub last_message: Option<Message>,
}
