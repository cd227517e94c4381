//! WebSocket surface: streaming snapshot push and rate-limited
//! command submission.

use std::time::{Duration, Instant, SystemTime};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use sim_ecs::config::env_or;
use sim_match::MatchId;
use tracing::warn;

use crate::dto::{payload_from_json, SnapshotView};
use crate::state::AppState;

/// Build the router for the WebSocket surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/containers/{cid}/matches/{mid}/snapshot", get(snapshot_socket))
        .route("/containers/{cid}/commands", get(command_socket))
        .with_state(state)
}

async fn snapshot_socket(
    State(state): State<AppState>,
    Path((cid, mid)): Path<(u64, u64)>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_snapshot_socket(socket, state, cid, mid))
}

async fn handle_snapshot_socket(mut socket: WebSocket, state: AppState, cid: u64, mid: u64) {
    let Some(handle) = state.containers.get(sim_match::ContainerId(cid)).await else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    let match_id = MatchId(mid);
    let Some(mut subscriber) = handle.subscribe_snapshots(match_id).await else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    if let Some(snapshot) = handle.current_snapshot(match_id).await {
        if send_snapshot(&mut socket, snapshot).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = subscriber.recv() => {
                match received {
                    Ok(snapshot) => {
                        if send_snapshot(&mut socket, snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text.trim() == "refresh" => {
                        if let Some(snapshot) = handle.current_snapshot(match_id).await {
                            if send_snapshot(&mut socket, snapshot).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        warn!(?err, "snapshot socket recv error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_snapshot(socket: &mut WebSocket, snapshot: sim_match::Snapshot) -> Result<(), axum::Error> {
    let view: SnapshotView = snapshot.into();
    let body = serde_json::to_string(&view).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(body.into())).await
}

#[derive(Debug, Deserialize)]
struct CommandSocketQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingCommand {
    command_name: String,
    match_id: u64,
    player_id: u64,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CommandAck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Commands per second a single command socket may submit before replies
/// start carrying a `RATE_LIMITED` status.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// The configured ceiling; defaults to 50 cmd/s.
    pub commands_per_second: u32,
}

impl RateLimitConfig {
    const DEFAULT_COMMANDS_PER_SECOND: u32 = 50;

    /// Build from environment variables, falling back to the documented default.
    #[must_use]
    pub fn from_env() -> Self {
        Self { commands_per_second: env_or("ws_command_rate_limit_per_second", Self::DEFAULT_COMMANDS_PER_SECOND) }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { commands_per_second: Self::DEFAULT_COMMANDS_PER_SECOND }
    }
}

struct RateLimiter {
    limit_per_second: u32,
    window_start: Instant,
    sent_this_window: u32,
}

impl RateLimiter {
    fn new(limit_per_second: u32) -> Self {
        Self { limit_per_second, window_start: Instant::now(), sent_this_window: 0 }
    }

    fn allow(&mut self) -> bool {
        if self.window_start.elapsed() >= Duration::from_secs(1) {
            self.window_start = Instant::now();
            self.sent_this_window = 0;
        }
        if self.sent_this_window >= self.limit_per_second {
            return false;
        }
        self.sent_this_window += 1;
        true
    }
}

async fn command_socket(
    State(state): State<AppState>,
    Path(cid): Path<u64>,
    Query(query): Query<CommandSocketQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_command_socket(socket, state, cid, query.token))
}

async fn handle_command_socket(mut socket: WebSocket, state: AppState, cid: u64, token: Option<String>) {
    let bearer = match token {
        Some(token) => token,
        None => {
            let _ = reply(&mut socket, CommandAck { status: "error", id: None, error: Some("missing token".to_string()) }).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let auth = state.auth.read().await;
    let verified = auth.verify_token(&bearer, SystemTime::now());
    drop(auth);
    let Ok(token) = verified else {
        let _ = reply(&mut socket, CommandAck { status: "error", id: None, error: Some("invalid token".to_string()) }).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    if !auth_core::matches(&token.scopes, "submit_commands") {
        let _ = reply(&mut socket, CommandAck { status: "error", id: None, error: Some("missing scope".to_string()) }).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let Some(handle) = state.containers.get(sim_match::ContainerId(cid)).await else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let mut limiter = RateLimiter::new(state.rate_limit.commands_per_second);
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };
        let incoming: Result<IncomingCommand, _> = serde_json::from_str(&text);
        let Ok(incoming) = incoming else {
            let _ = reply(&mut socket, CommandAck { status: "error", id: None, error: Some("malformed command".to_string()) }).await;
            continue;
        };

        if !limiter.allow() {
            let _ = reply(
                &mut socket,
                CommandAck { status: "error", id: incoming.id.clone(), error: Some("rate limited".to_string()) },
            )
            .await;
            continue;
        }

        let payload = match payload_from_json(&incoming.parameters) {
            Ok(payload) => payload,
            Err(err) => {
                let _ = reply(&mut socket, CommandAck { status: "error", id: incoming.id.clone(), error: Some(err.message) }).await;
                continue;
            }
        };

        let outcome = handle
            .submit_command(
                MatchId(incoming.match_id),
                sim_match::PlayerId(incoming.player_id),
                incoming.command_name,
                payload,
            )
            .await;
        let ack = match outcome {
            Ok(()) => CommandAck { status: "accepted", id: incoming.id, error: None },
            Err(err) => CommandAck { status: "error", id: incoming.id, error: Some(err.message) },
        };
        if reply(&mut socket, ack).await.is_err() {
            break;
        }
    }
}

async fn reply(socket: &mut WebSocket, ack: CommandAck) -> Result<(), axum::Error> {
    let body = serde_json::to_string(&ack).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(body.into())).await
}
