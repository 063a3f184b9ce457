//! Connection Fabric's WebSocket transport binding: the actual
//! `/ws/:session_id` upgrade handler. Authenticates the opaque query
//! token, registers with the Orchestrator, dispatches inbound control
//! messages and PCM16 audio frames, and forwards outbound session-bus
//! events back to the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use voice_relay_core::{AudioFrame, BusPublisher, CallRepository, Language, SessionBusEvent, SessionId, StreamKey, UserId};

use crate::http::parse_ws_query;
use crate::state::AppState;

/// Outbound mpsc buffer handed to the Connection Fabric for this socket
/// ("serialize via a per-connection outbound queue").
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Heartbeat,
    Mute { muted: bool },
    Leave,
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlAck {
    HeartbeatAck,
    MuteAck { muted: bool },
    Pong,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, axum::http::StatusCode> {
    let query = parse_ws_query(&params).ok_or(axum::http::StatusCode::BAD_REQUEST)?;
    let user_id = authenticate(&state, &query.token, &query.user_id).ok_or_else(|| {
            warn!(user_id = %query.user_id, "websocket upgrade rejected: invalid token");
            axum::http::StatusCode::UNAUTHORIZED
    })?;
    let session_id = SessionId::from(session_id);

    if !session_id.is_lobby() {
        let connected = state.orchestrator.repository().connected_count(&session_id);
        let max = state.get_config().orchestrator.max_participants;
        if connected >= max {
            warn!(session_id = %session_id, connected, max, "websocket upgrade rejected: session full");
            return Err(axum::http::StatusCode::CONFLICT);
        }
    }

    let source_lang = resolve_language(&state, &session_id, &user_id).await;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, user_id, source_lang)))
}

/// Validate the opaque connection token. The real auth adapter is an
/// external collaborator; this reuses the same bearer `api_key` already
/// configured for the HTTP surface rather than inventing a second
/// credential store.
fn authenticate(state: &AppState, token: &str, user_id: &str) -> Option<UserId> {
    let auth = state.get_config().server.auth.clone();
    if !auth.enabled {
        return Some(UserId::from(user_id.to_string()));
    }
    match auth.api_key {
        Some(key) if !key.is_empty() && key == token => Some(UserId::from(user_id.to_string())),
        _ => None,
    }
}

/// Resolve the language a connection should be filtered on: an existing
/// participant's configured language, or the configured default for a
/// first-time join / lobby presence connection.
async fn resolve_language(state: &AppState, session_id: &SessionId, user_id: &UserId) -> Language {
    let default_lang = {
        let config = state.get_config();
        Language::parse(&config.translation.default_participant_language).unwrap_or(Language::English)
    };

    if session_id.is_lobby() {
        return default_lang;
    }

    state
        .orchestrator
        .repository()
        .get_participant_language(session_id, user_id)
        .await
        .unwrap_or(default_lang)
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: SessionId,
    user_id: UserId,
    source_lang: Language,
) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(AsyncMutex::new(sender));

    let mut outbound_rx = state
        .orchestrator
        .handle_connection(&session_id, &user_id, source_lang, OUTBOUND_CHANNEL_CAPACITY)
        .await;

    let key = StreamKey::new(session_id.clone(), user_id.clone());
    if !session_id.is_lobby() {
        state.orchestrator.ensure_speaker(key.clone(), source_lang);
    }

    metrics::gauge!(voice_relay_core::metric_names::ACTIVE_CONNECTIONS).increment(1.0);
    info!(session_id = %session_id, user_id = %user_id, "connection established");

    let forward_sender = sender.clone();
    let forward_task = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                let mut s = forward_sender.lock().await;
                if s.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !handle_control_message(&state, &sender, &session_id, &user_id, &text).await {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                handle_audio_frame(&state, &key, &session_id, &user_id, source_lang, data);
            }
            Ok(Message::Ping(payload)) => {
                let mut s = sender.lock().await;
                let _ = s.send(Message::Pong(payload)).await;
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!(session_id = %session_id, user_id = %user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forward_task.abort();
    cleanup_connection(&state, &session_id, &key, &user_id, source_lang).await;
}

/// Handle one text control message: `heartbeat`,
/// `mute`, `leave`, `ping`. Returns `false` to end the dispatch loop
/// (a `leave` message initiates graceful disconnect).
async fn handle_control_message(
    state: &AppState,
    sender: &Arc<AsyncMutex<futures::stream::SplitSink<WebSocket, Message>>>,
    session_id: &SessionId,
    user_id: &UserId,
    text: &str,
) -> bool {
    let control: ControlMessage = match serde_json::from_str(text) {
        Ok(control) => control,
        Err(err) => {
            debug!(error = %err, "ignoring unrecognized control message");
            return true;
        }
    };

    match control {
        ControlMessage::Heartbeat => {
            send_ack(sender, &ControlAck::HeartbeatAck).await;
        }
        ControlMessage::Ping => {
            send_ack(sender, &ControlAck::Pong).await;
        }
        ControlMessage::Mute { muted } => {
            if !session_id.is_lobby() {
                state.orchestrator.repository().set_muted(session_id, user_id, muted);
                state
                    .bus
                    .publish(SessionBusEvent::MuteStatusChanged {
                        session_id: session_id.clone(),
                        user_id: user_id.clone(),
                        muted,
                    })
                    .await;
            }
            send_ack(sender, &ControlAck::MuteAck { muted }).await;
        }
        ControlMessage::Leave => {
            return false;
        }
    }
    true
}

async fn send_ack(sender: &Arc<AsyncMutex<futures::stream::SplitSink<WebSocket, Message>>>, ack: &ControlAck) {
    if let Ok(json) = serde_json::to_string(ack) {
        let mut s = sender.lock().await;
        let _ = s.send(Message::Text(json)).await;
    }
}

/// Append one inbound PCM16 frame to the ingestion stream and feed it to
/// the speaker's chunker + streaming driver.
fn handle_audio_frame(
    state: &AppState,
    key: &StreamKey,
    session_id: &SessionId,
    user_id: &UserId,
    source_lang: Language,
    data: Vec<u8>,
) {
    if session_id.is_lobby() {
        return;
    }

    metrics::counter!(voice_relay_core::metric_names::FRAMES_INGESTED).increment(1);

    let record_id = match state
        .ingestion
        .append(session_id.clone(), user_id.clone(), source_lang, data.clone())
    {
        Ok(id) => id,
        Err(err) => {
            warn!(session_id = %session_id, user_id = %user_id, error = %err, "ingestion backpressure, dropping frame");
            return;
        }
    };

    let frame = AudioFrame::new(session_id.clone(), user_id.clone(), source_lang, data);
    state.orchestrator.feed_audio(key, &frame);

    // The chunker/interim driver just consumed this record synchronously
    // above, so the consumer group acknowledges it immediately; a
    // deployment with a real out-of-process log would ack from the
    // consumer task instead.
    let _ = state.ingestion.ack(key, record_id);
}

/// Mirror of `handle_connection`'s setup: unregister from the fabric,
/// tear down the speaker runtime, and let the Orchestrator run its own
/// disconnect/grace-period bookkeeping.
async fn cleanup_connection(
    state: &AppState,
    session_id: &SessionId,
    key: &StreamKey,
    user_id: &UserId,
    source_lang: Language,
) {
    if !session_id.is_lobby() {
        state.orchestrator.flush_speaker(key, source_lang);
        state.orchestrator.remove_speaker(key);
        state.ingestion.clear(key);
    }
    state.orchestrator.on_disconnect(session_id, user_id).await;
    metrics::gauge!(voice_relay_core::metric_names::ACTIVE_CONNECTIONS).decrement(1.0);
    info!(session_id = %session_id, user_id = %user_id, "connection closed");
}
