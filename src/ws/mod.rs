pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

pub const PROTOCOL_VERSION: &str = "1.0";

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump one client connection: forward the room's broadcast channel and
/// dispatch inbound commands
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = ulid::Ulid::new().to_string();

    tracing::info!(connection_id = %connection_id, "websocket connected");

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        connection_id: connection_id.clone(),
        server_now: chrono::Utc::now(),
    };
    if let Ok(msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            tracing::error!(connection_id = %connection_id, "failed to send welcome message");
            return;
        }
    }

    // Subscribed after the first create/join/rejoin, dropped on leave
    let mut room_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    loop {
        tokio::select! {
            room_msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await,
                    // not in a room: wait forever
                    None => std::future::pending().await,
                }
            } => {
                let msg = match room_msg {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(connection_id = %connection_id, skipped, "slow websocket client");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // room is gone
                        room_rx = None;
                        continue;
                    }
                };

                let kicked_me = matches!(
                    &msg,
                    ServerMessage::PlayerKicked { connection_id: target } if *target == connection_id
                );
                let to_send = if kicked_me { ServerMessage::Kicked } else { msg };

                if let Ok(json) = serde_json::to_string(&to_send) {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                if kicked_me {
                    room_rx = None;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let outcome =
                                    handlers::handle_command(&state, &connection_id, client_msg)
                                        .await;

                                match outcome.subscription {
                                    handlers::SubscriptionChange::Join(code) => {
                                        room_rx = Some(state.subscribe(&code));
                                    }
                                    handlers::SubscriptionChange::Leave => {
                                        room_rx = None;
                                    }
                                    handlers::SubscriptionChange::Keep => {}
                                }

                                if let Some(reply) = outcome.reply {
                                    if let Ok(json) = serde_json::to_string(&reply) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::debug!(connection_id = %connection_id, error = %e, "unparseable client message");
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("invalid message format: {e}"),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "websocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handlers::run_leave_path(&state, &connection_id).await;
    tracing::info!(connection_id = %connection_id, "websocket disconnected");
}
