//! WebSocket handler for live voice sessions
//!
//! Each accepted upgrade runs three tasks: a send pump draining relay output
//! to the socket (text envelopes and binary audio, plus heartbeat pings), a
//! receive pump parsing client envelopes, and a relay pump that owns the
//! `RelaySession` and the engine connection. Either pump ending tears the
//! session down; queued downstream frames get a bounded drain so a final
//! `error` envelope still reaches the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::{rate_limit, ApiState};
use crate::engine::{self, EngineEvent, EngineHandle};
use crate::protocol::ControlEnvelope;
use crate::relay::{Outbound, RelaySession};
use crate::session::LiveSession;

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/voice", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if !rate_limit::allow(&state.limiter, addr.ip()) {
        tracing::warn!(ip = %addr.ip(), "websocket upgrade rate limited");
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

/// Handle one voice session end to end
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(32);
    let (live, close_rx) = match state.registry.admit(out_tx.clone()).await {
        Ok(pair) => pair,
        Err(error) => {
            tracing::warn!(error = %error, "session rejected");
            let rejected = ControlEnvelope::Error {
                message: error.to_string(),
            };
            if let Ok(text) = rejected.to_json() {
                let _ = sender.send(Message::Text(text.into())).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let session_id = live.id;
    tracing::info!(session_id = %session_id, "voice session connected");

    // First envelope on a new channel names the session.
    let started = ControlEnvelope::SessionStarted { session_id };
    if let Ok(text) = started.to_json() {
        if sender.send(Message::Text(text.into())).await.is_err() {
            state.registry.release(session_id).await;
            return;
        }
    }

    let (handle, events) = match engine::connect(&state.config.engine).await {
        Ok(pair) => pair,
        Err(error) => {
            tracing::error!(session_id = %session_id, error = %error, "engine connection failed");
            let unavailable = ControlEnvelope::Error {
                message: "speech engine unavailable".to_string(),
            };
            if let Ok(text) = unavailable.to_json() {
                let _ = sender.send(Message::Text(text.into())).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            state.registry.release(session_id).await;
            return;
        }
    };

    let relay = RelaySession::new(&state.config.audio, &state.config.handoff);
    let (env_tx, env_rx) = mpsc::channel::<ControlEnvelope>(32);
    let heartbeat = Duration::from_secs(state.config.server.heartbeat_secs.max(1));

    // Send pump: relay output to the socket, heartbeat pings in between.
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                out = out_rx.recv() => {
                    let Some(out) = out else { break };
                    let message = match out {
                        Outbound::Envelope(envelope) => match envelope.to_json() {
                            Ok(text) => Message::Text(text.into()),
                            Err(error) => {
                                tracing::warn!(error = %error, "dropping unserializable envelope");
                                continue;
                            }
                        },
                        Outbound::Audio(bytes) => Message::Binary(bytes.into()),
                    };
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let mut relay_task = tokio::spawn(relay_pump(
        relay,
        handle,
        events,
        env_rx,
        out_tx,
        Arc::clone(&live),
        close_rx,
    ));

    // Receive pump: client frames to control envelopes.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match ControlEnvelope::from_json(&text) {
                    Ok(envelope) => {
                        if env_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(session_id = %session_id, error = %error, "dropping malformed frame");
                    }
                },
                // Uplink audio travels as text envelopes; raw binary is a peer bug.
                Message::Binary(data) => {
                    tracing::warn!(session_id = %session_id, len = data.len(), "unexpected binary frame from client");
                }
                Message::Ping(data) => {
                    tracing::trace!(len = data.len(), "received ping");
                }
                Message::Pong(_) => {}
                Message::Close(_) => {
                    tracing::info!(session_id = %session_id, "closed by client");
                    break;
                }
            }
        }
    });

    // Either side ending tears the other down.
    tokio::select! {
        _ = &mut recv_task => relay_task.abort(),
        _ = &mut relay_task => recv_task.abort(),
    }

    state.registry.release(session_id).await;
    drop(live);

    // The send pump exits once every Outbound sender is gone; give queued
    // frames a bounded window to reach the client first.
    let _ = tokio::time::timeout(Duration::from_secs(1), &mut send_task).await;
    send_task.abort();

    tracing::info!(session_id = %session_id, "voice session disconnected");
}

/// Pump engine events and client envelopes through one relay session
async fn relay_pump(
    mut relay: RelaySession,
    engine: EngineHandle,
    mut events: mpsc::Receiver<EngineEvent>,
    mut envelopes: mpsc::Receiver<ControlEnvelope>,
    out_tx: mpsc::Sender<Outbound>,
    live: Arc<LiveSession>,
    mut close_rx: watch::Receiver<bool>,
) {
    'pump: loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                live.touch();
                for out in relay.handle_engine_event(event) {
                    if out_tx.send(out).await.is_err() {
                        break 'pump;
                    }
                }
                if relay.is_finished() {
                    break;
                }
            }
            envelope = envelopes.recv() => {
                let Some(envelope) = envelope else { break };
                live.touch();
                let (commands, replies) = relay.handle_client_envelope(envelope).await;
                for command in commands {
                    if engine.send(command).await.is_err() {
                        tracing::error!(session_id = %live.id, "engine connection lost");
                        let lost = ControlEnvelope::Error {
                            message: "speech engine connection lost".to_string(),
                        };
                        let _ = out_tx.send(Outbound::Envelope(lost)).await;
                        break 'pump;
                    }
                }
                for out in replies {
                    if out_tx.send(out).await.is_err() {
                        break 'pump;
                    }
                }
                if relay.is_finished() {
                    break;
                }
            }
            _ = close_rx.changed() => {
                tracing::info!(session_id = %live.id, "session expired by registry");
                break;
            }
        }
    }
}
