//! Account endpoints: signup, login, auth check, profile update.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use colloquy_shared::protocol::UserPayload;
use colloquy_store::ProfileUpdate;

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    bio: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    success: bool,
    message: &'static str,
    token: String,
    user_data: UserPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    user_data: UserPayload,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if req.full_name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Full name, email and password are required".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;

    let user = state.store.lock().await.create_user(
        req.full_name.trim(),
        req.email.trim(),
        &password_hash,
        req.bio.trim(),
    )?;

    info!(user = %user.id, "account created");

    let token = state.tokens.issue(user.id);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "Account created successfully",
            token,
            user_data: user.into_payload(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state.store.lock().await.user_by_email(req.email.trim())?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    info!(user = %user.id, "login");

    let token = state.tokens.issue(user.id);
    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful",
        token,
        user_data: user.into_payload(),
    }))
}

pub async fn check_auth(AuthUser(user): AuthUser) -> Json<UserDataResponse> {
    Json(UserDataResponse {
        success: true,
        message: None,
        user_data: user.into_payload(),
    })
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserDataResponse>, ApiError> {
    let updated = state.store.lock().await.update_profile(user.id, &update)?;

    Ok(Json(UserDataResponse {
        success: true,
        message: Some("Profile updated successfully"),
        user_data: updated.into_payload(),
    }))
}
