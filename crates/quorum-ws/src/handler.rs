use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use quorum_core::AppState;
use quorum_models::gateway::{ClientAction, EventKind};
use serde::Serialize;
use serde_json::json;
use tokio::time::Duration;

use crate::actions;
use crate::session::Session;

const WS_PING_INTERVAL_SECS: u64 = 20;

/// Send an `{ "event": ..., "data": ... }` frame to this connection.
pub(crate) async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &str,
    data: &impl Serialize,
) -> Result<(), ()> {
    let frame = json!({ "event": event, "data": data }).to_string();
    tracing::trace!(event, bytes = frame.len(), "gateway frame out");
    sender.send(Message::Text(frame.into())).await.map_err(|_| ())
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let mut session = Session::new();
    let mut event_rx = state.event_bus.subscribe();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(connection_id = %session.connection_id, "client connected");

    let mut ws_ping_interval =
        tokio::time::interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let action = match serde_json::from_str::<ClientAction>(&text) {
                            Ok(action) => action,
                            Err(err) => {
                                // Unknown actions and malformed frames are
                                // logged and ignored, never fatal.
                                tracing::debug!(
                                    connection_id = %session.connection_id,
                                    error = %err,
                                    "ignoring unparseable client frame"
                                );
                                continue;
                            }
                        };
                        actions::handle_action(&state, &mut session, action, &mut sender).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break if let Some(frame) = frame {
                            format!("client close frame (code={}, reason={})", frame.code, frame.reason)
                        } else {
                            "client close frame (no code/reason)".to_string()
                        };
                    }
                    Some(Err(err)) => {
                        break format!("websocket receive error: {err}");
                    }
                    None => {
                        break "websocket stream ended".to_string();
                    }
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !session.should_receive_event(&event.room_code) {
                            continue;
                        }
                        if send_event(&mut sender, event.kind.as_str(), &event.payload)
                            .await
                            .is_err()
                        {
                            break "websocket send error".to_string();
                        }
                        // A session-ended broadcast is terminal for the room:
                        // the client has been told to leave, drop the binding.
                        if event.kind == EventKind::SessionEnded {
                            session.unbind();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            skipped,
                            "event stream lagged; forcing reconnect"
                        );
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: 1013,
                                reason: "Gateway fell behind; reconnect required".into(),
                            })))
                            .await;
                        break format!("event stream lagged by {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break "event stream closed".to_string();
                    }
                }
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    tracing::info!(
        connection_id = %session.connection_id,
        reason = %disconnect_reason,
        "client disconnected"
    );

    // A closed transport is an implicit leave for whatever room the
    // connection was bound to.
    actions::handle_disconnect(&state, &session).await;
}
