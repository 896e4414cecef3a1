use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, UserId};

/// Events the server pushes over the WebSocket channel.
///
/// Serialized as `{"event": "...", "data": ...}` with camelCase event
/// names, matching what browser clients listen for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full snapshot of online user ids, sent to every live session on
    /// each presence change.
    GetOnlineUsers(Vec<UserId>),

    /// A newly stored message, pushed to both participants.
    NewMessage(MessagePayload),

    /// A message's read receipt, pushed to the sender.
    MessageSeen(SeenPayload),

    /// A deleted message id, pushed to both participants.
    MessageDeleted(MessageId),
}

/// Wire shape of a message as clients see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    pub image: Option<String>,
    pub seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Read-receipt notification payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeenPayload {
    pub message_id: MessageId,
    pub seen_at: DateTime<Utc>,
}

/// Wire shape of a user profile (never carries the password hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub bio: String,
    pub profile_pic: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
