//! # colloquy-server
//!
//! HTTP + WebSocket server for 1:1 chat:
//! - **REST API** (axum) for accounts, conversations, and read receipts
//! - **WebSocket channel** carrying presence snapshots and best-effort
//!   message/receipt/delete events to connected clients
//! - **Presence registry** mapping online users to live sessions
//! - **SQLite persistence** for users and the message log
//! - **Image attachment storage** on local disk, referenced by URL

mod auth;
mod config;
mod dispatch;
mod error;
mod media;
mod presence;
mod rate_limit;
mod routes;
mod ws;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use colloquy_store::Database;

use crate::auth::TokenSigner;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::media::MediaStore;
use crate::presence::PresenceRegistry;
use crate::rate_limit::RateLimiter;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,colloquy_server=debug")),
        )
        .init();

    info!("Starting colloquy server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        db = %config.database_path.display(),
        heartbeat_timeout = ?config.heartbeat_timeout,
        heartbeat_interval = ?config.heartbeat_interval,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    let store = Database::open(&config.database_path)?;

    let media = Arc::new(
        MediaStore::new(config.media_storage_path.clone(), config.max_upload_size).await?,
    );

    let tokens = Arc::new(TokenSigner::new(config.token_key, config.token_ttl));

    let presence = PresenceRegistry::new();
    let dispatcher = Dispatcher::new(presence.clone());

    let rate_limiter = RateLimiter::default();

    let app_state = AppState {
        store: Arc::new(Mutex::new(store)),
        presence,
        dispatcher,
        media,
        tokens,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = routes::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
