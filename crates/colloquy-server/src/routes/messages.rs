//! Message endpoints: the sidebar aggregation, conversation fetch,
//! send, read receipt, and delete.
//!
//! Every mutation dispatches its best-effort real-time event after the
//! store lock is released; a failed push never fails the request.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use colloquy_shared::protocol::{MessagePayload, UserPayload};
use colloquy_shared::{MessageId, UserId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Serialize)]
pub struct SidebarResponse {
    success: bool,
    users: Vec<SidebarUser>,
    total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarUser {
    #[serde(flatten)]
    user: UserPayload,
    unseen_count: u64,
    last_message: Option<MessagePayload>,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    success: bool,
    messages: Vec<MessagePayload>,
}

#[derive(Serialize)]
pub struct SendResponse {
    success: bool,
    message: MessagePayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenResponse {
    success: bool,
    message: &'static str,
    seen_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    success: bool,
    message: &'static str,
}

/// `GET /api/messages/users` -- every other user, most recently seen
/// first, each with their pending unseen count and the latest message
/// exchanged.  Recomputed from the log on every call.
pub async fn sidebar_users(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<SidebarResponse>, ApiError> {
    let store = state.store.lock().await;
    let users = store.list_users_except(me.id)?;
    let mut summaries = store.unseen_summary(me.id)?;
    drop(store);

    let total = users.len();
    let users = users
        .into_iter()
        .map(|user| {
            let summary = summaries.remove(&user.id);
            SidebarUser {
                user: user.into_payload(),
                unseen_count: summary.as_ref().map_or(0, |s| s.unseen_count),
                last_message: summary
                    .and_then(|s| s.last_message)
                    .map(|m| m.into_payload()),
            }
        })
        .collect();

    Ok(Json(SidebarResponse {
        success: true,
        users,
        total,
    }))
}

/// `GET /api/messages/:counterpartId` -- the full conversation, oldest
/// first.  Fetching it marks the counterpart's messages seen.
pub async fn conversation(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(counterpart): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let counterpart = parse_user_id(&counterpart)?;

    let messages = state.store.lock().await.conversation(me.id, counterpart)?;

    Ok(Json(ConversationResponse {
        success: true,
        messages: messages.into_iter().map(|m| m.into_payload()).collect(),
    }))
}

/// `POST /api/messages/:counterpartId` -- multipart with an optional
/// `text` field and an optional `image` file.
pub async fn send(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(receiver): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SendResponse>), ApiError> {
    let receiver = parse_user_id(&receiver)?;

    let mut text: Option<String> = None;
    let mut image_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
    {
        match field.name().unwrap_or("") {
            "text" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                text = Some(value);
            }
            "image" => {
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                // Upload failure is fatal here: the message must not be
                // stored with a dangling reference.
                image_url = Some(state.media.store_image(&data, &content_type).await?);
            }
            _ => {}
        }
    }

    let message = {
        let store = state.store.lock().await;
        let message =
            store.append_message(me.id, receiver, text.as_deref(), image_url.as_deref())?;
        store.touch_last_seen(&[me.id, receiver], message.created_at)?;
        message
    };

    info!(
        message = %message.id,
        sender = %me.id,
        receiver = %receiver,
        has_image = message.image_url.is_some(),
        "message stored"
    );

    state.dispatcher.message_created(&message).await;

    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            success: true,
            message: message.into_payload(),
        }),
    ))
}

/// `PUT /api/messages/mark/:id` -- explicit, idempotent read receipt.
pub async fn mark_seen(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    let id = parse_message_id(&id)?;

    let (message, transitioned) = state.store.lock().await.mark_seen(id, me.id)?;

    if transitioned {
        state.dispatcher.message_seen(&message).await;
    }

    // mark_seen always returns a seen message.
    let seen_at = message
        .seen_at
        .ok_or_else(|| ApiError::Internal("seen message without seen_at".to_string()))?;

    Ok(Json(MarkSeenResponse {
        success: true,
        message: "Message marked as seen",
        seen_at,
    }))
}

/// `DELETE /api/messages/:id` -- sender-only permanent removal.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_message_id(&id)?;

    let message = state.store.lock().await.remove_message(id, me.id)?;

    info!(message = %message.id, sender = %me.id, "message deleted");

    // Attachment cleanup is best-effort; the delete already happened.
    if let Some(url) = &message.image_url {
        state.media.delete_by_url(url).await;
    }

    state.dispatcher.message_deleted(&message).await;

    Ok(Json(DeleteResponse {
        success: true,
        message: "Message deleted successfully",
    }))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    UserId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid user id".to_string()))
}

fn parse_message_id(raw: &str) -> Result<MessageId, ApiError> {
    MessageId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid message id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidebar_response_flattens_user_fields() {
        let user = UserPayload {
            id: UserId::new(),
            full_name: "Alice".into(),
            email: "a@example.com".into(),
            bio: String::new(),
            profile_pic: None,
            last_seen: Utc::now(),
            created_at: Utc::now(),
        };

        let response = SidebarResponse {
            success: true,
            users: vec![SidebarUser {
                user,
                unseen_count: 3,
                last_message: None,
            }],
            total: 1,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total"], 1);
        // Profile fields sit beside the per-counterpart extras, camelCase.
        assert_eq!(json["users"][0]["fullName"], "Alice");
        assert_eq!(json["users"][0]["unseenCount"], 3);
    }
}
