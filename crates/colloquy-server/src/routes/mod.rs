pub mod messages;
pub mod users;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use colloquy_store::Database;

use crate::auth::TokenSigner;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::presence::PresenceRegistry;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Database>>,
    pub presence: PresenceRegistry,
    pub dispatcher: Dispatcher,
    pub media: Arc<MediaStore>,
    pub tokens: Arc<TokenSigner>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    // Only the credential endpoints are rate limited; everything else
    // already requires a valid token.
    let credential_routes = Router::new()
        .route("/api/users/signup", post(users::signup))
        .route("/api/users/login", post(users::login))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/users/check-auth", get(users::check_auth))
        .route("/api/users/update-profile", put(users::update_profile))
        .route("/api/messages/users", get(messages::sidebar_users))
        .route("/api/messages/mark/:id", put(messages::mark_seen))
        .route(
            "/api/messages/:id",
            get(messages::conversation)
                .post(messages::send)
                .delete(messages::delete),
        )
        .route("/media/:file_name", get(media_file))
        .route("/ws", get(ws::ws_handler))
        .merge(credential_routes)
        .layer(DefaultBodyLimit::max(state.config.max_upload_size + 64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Server is healthy",
        timestamp: Utc::now(),
    })
}

/// Serve a stored image attachment.
async fn media_file(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, content_type) = state.media.load(&file_name).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state).fallback(not_found);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "message": "Endpoint not found",
        })),
    )
}
