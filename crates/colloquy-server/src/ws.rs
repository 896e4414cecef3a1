//! WebSocket session lifecycle.
//!
//! On connect: extract the `userId` handshake parameter, register the
//! session in the presence registry, and broadcast the new online set to
//! every live session.  On close, error, or heartbeat timeout: unregister
//! (guarded by session identity) and broadcast again.  Sessions without
//! a usable `userId` never enter the online map but stay in the
//! broadcast set, so they still receive presence snapshots.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use colloquy_shared::UserId;

use crate::presence::SessionHandle;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    // Identity was authenticated upstream; a missing or malformed id
    // just means an anonymous session with no presence entry.
    let user_id = match params.user_id.as_deref() {
        Some(raw) => match UserId::parse(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                debug!(raw, "unparseable userId on handshake, treating as anonymous");
                None
            }
        },
        None => None,
    };

    ws.on_upgrade(move |socket| run_session(socket, user_id, state))
}

async fn run_session(socket: WebSocket, user_id: Option<UserId>, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // All outbound frames (pushed events and pings) funnel through one
    // writer task, so the registry can hand out cheap sender handles.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let handle = SessionHandle::new(tx.clone());
    let session_id = handle.session_id();

    // Every session joins the broadcast set; only identified ones
    // appear in the online map.
    state.presence.attach(handle.clone()).await;
    if let Some(user_id) = user_id {
        info!(user = %user_id, session = %session_id, "session connected");
        state.presence.register(user_id, handle).await;
    } else {
        debug!(session = %session_id, "anonymous session connected");
    }
    state.presence.broadcast_snapshot().await;

    let mut ping = tokio::time::interval(state.config.heartbeat_interval);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if last_activity.elapsed() >= state.config.heartbeat_timeout {
                    info!(session = %session_id, "heartbeat timeout, evicting session");
                    break;
                }
                if tx.send(Message::Ping(Vec::new())).is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    // Any inbound frame counts as a heartbeat; client
                    // frames carry no commands in this protocol.
                    Some(Ok(_)) => last_activity = Instant::now(),
                    Some(Err(e)) => {
                        debug!(session = %session_id, error = %e, "session read error");
                        break;
                    }
                }
            }
        }
    }

    drop(tx);
    writer.abort();

    state.presence.detach(session_id).await;
    if let Some(user_id) = user_id {
        // Guarded removal: if the user reconnected meanwhile, this
        // teardown must not evict the newer session.
        if state.presence.unregister(user_id, session_id).await {
            info!(user = %user_id, session = %session_id, "session disconnected");
            state.presence.broadcast_snapshot().await;
        } else {
            debug!(
                user = %user_id,
                session = %session_id,
                "stale session closed after reconnect, registry untouched"
            );
        }
    }
}
