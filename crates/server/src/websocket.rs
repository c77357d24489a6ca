//! WebSocket Handler
//!
//! One socket carries one call. Binary frames are caller audio; text frames
//! are JSON `{type, payload}` control messages. Session events flow back as
//! the same envelope, with synthesized audio as binary frames.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use voice_agent_agent::{AgentError, SessionSnapshot, VoiceSessionEvent};
use voice_agent_core::CostBreakdown;
use voice_agent_persistence::CallSummary;

use crate::session::LiveSession;
use crate::state::AppState;

/// Largest accepted inbound frame
const MAX_MESSAGE_BYTES: usize = 512 * 1024;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Server-to-client messages, serialized as `{"type": ..., "payload": ...}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        agent_id: String,
        room_name: String,
    },
    Transcript {
        text: String,
        is_final: bool,
    },
    AgentResponse(String),
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
        status: String,
    },
    ToolResult {
        id: String,
        name: String,
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    CallSummary {
        summary: Box<CallSummary>,
        cost: CostBreakdown,
    },
    CallEnd(String),
    Session(Box<SessionSnapshot>),
    Error(String),
    Pong(i64),
}

impl ServerMessage {
    fn to_frame(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize WebSocket message");
                None
            },
        }
    }
}

/// Client-to-server control message
#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    room: Option<String>,
}

/// `GET /ws?room=`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let room = query
        .room
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("room-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()));

    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state, room))
}

async fn handle_socket(socket: WebSocket, state: AppState, room: String) {
    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    let live = match state.create_session(&room) {
        Ok(live) => live,
        Err(e) => {
            tracing::warn!(room = %room, error = %e, "Refusing WebSocket session");
            send(&sender, &ServerMessage::Error(format!("Failed to create agent: {}", e))).await;
            let _ = sender.lock().await.close().await;
            return;
        },
    };
    metrics::counter!("voice_agent_ws_connections_total").increment(1);

    let session = Arc::clone(&live.session);
    let events = session.subscribe();
    send(
        &sender,
        &ServerMessage::Connected {
            agent_id: session.session_id().to_string(),
            room_name: room.clone(),
        },
    )
    .await;

    let event_task = tokio::spawn(forward_events(events, sender.clone()));
    session.start().await;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Binary(audio)) => {
                live.touch();
                push_audio(&live, &sender, &audio).await;
            },
            Ok(Message::Text(text)) => {
                live.touch();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => handle_control(&live, &sender, message).await,
                    Err(e) => tracing::debug!(error = %e, "Ignoring malformed control message"),
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                tracing::debug!(session_id = %session.session_id(), error = %e, "WebSocket read failed");
                break;
            },
        }
    }

    // Disconnect stops the session; it does not produce a summary
    session.stop().await;
    state.sessions.remove(session.session_id());
    event_task.abort();
    tracing::info!(session_id = %session.session_id(), "WebSocket closed");
}

async fn handle_control(live: &Arc<LiveSession>, sender: &WsSender, message: ClientMessage) {
    let session = &live.session;
    match message.kind.as_str() {
        "text_input" => {
            let Some(text) = message.payload.as_str().map(str::to_string) else {
                send(sender, &ServerMessage::Error("Invalid text input format".to_string())).await;
                return;
            };
            let session = Arc::clone(session);
            let sender = sender.clone();
            tokio::spawn(async move {
                match session.send_text_input(&text).await {
                    Ok(_) => {},
                    Err(e @ (AgentError::InvalidInput(_) | AgentError::Ended)) => {
                        send(&sender, &ServerMessage::Error(e.to_string())).await;
                    },
                    // Already published as an error event by the session
                    Err(e) => tracing::debug!(error = %e, "Text input turn failed"),
                }
            });
        },
        "audio" => {
            let decoded = message.payload.as_str().map(|data| BASE64.decode(data));
            match decoded {
                Some(Ok(audio)) => push_audio(live, sender, &audio).await,
                _ => send(sender, &ServerMessage::Error("Invalid audio payload".to_string())).await,
            }
        },
        "end_call" => {
            tracing::info!(session_id = %session.session_id(), "End call requested");
            let session = Arc::clone(session);
            tokio::spawn(async move {
                session.end_call().await;
            });
        },
        "get_session" => {
            send(sender, &ServerMessage::Session(Box::new(session.snapshot()))).await;
        },
        "ping" => {
            send(sender, &ServerMessage::Pong(Utc::now().timestamp_millis())).await;
        },
        other => tracing::debug!(kind = %other, "Ignoring unknown control message"),
    }
}

async fn push_audio(live: &Arc<LiveSession>, sender: &WsSender, audio: &[u8]) {
    if let Err(e) = live.session.push_audio(audio).await {
        send(sender, &ServerMessage::Error(format!("Audio processing error: {}", e))).await;
    }
}

async fn send(sender: &WsSender, message: &ServerMessage) {
    if let Some(frame) = message.to_frame() {
        let _ = sender.lock().await.send(frame).await;
    }
}

async fn forward_events(mut events: broadcast::Receiver<VoiceSessionEvent>, sender: WsSender) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "WebSocket client lagging, events dropped");
                continue;
            },
            Err(broadcast::error::RecvError::Closed) => break,
        };

        for frame in frames_for(event) {
            if sender.lock().await.send(frame).await.is_err() {
                return;
            }
        }
    }
}

/// Wire frames for one session event
fn frames_for(event: VoiceSessionEvent) -> Vec<Message> {
    let messages = match event {
        VoiceSessionEvent::Started { .. } => Vec::new(),
        VoiceSessionEvent::Audio(audio) => return vec![Message::Binary(audio)],
        VoiceSessionEvent::Transcript { text, is_final } => {
            vec![ServerMessage::Transcript { text, is_final }]
        },
        VoiceSessionEvent::AgentResponse { text } => vec![ServerMessage::AgentResponse(text)],
        VoiceSessionEvent::ToolCall {
            id,
            name,
            arguments,
        } => vec![ServerMessage::ToolCall {
            id,
            name,
            arguments,
            status: "executing".to_string(),
        }],
        VoiceSessionEvent::ToolResult {
            id,
            name,
            result,
            error,
        } => vec![ServerMessage::ToolResult {
            id,
            name,
            result,
            error,
        }],
        VoiceSessionEvent::Error { message } => vec![ServerMessage::Error(message)],
        VoiceSessionEvent::CallEnded { summary, cost } => vec![
            ServerMessage::CallSummary {
                summary: Box::new(summary),
                cost,
            },
            ServerMessage::CallEnd("Call ended".to_string()),
        ],
    };

    messages.iter().filter_map(ServerMessage::to_frame).collect()
}
