use quorum_fanout::HandlerRegistry;
use quorum_models::gateway::{EventKind, FanoutMessage};
use tokio::sync::broadcast;

use crate::AppState;

/// An event scoped to one room, as delivered to this process's local
/// connections. The same payload goes out through the fan-out client for
/// other processes.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub kind: EventKind,
    pub room_code: String,
    pub payload: serde_json::Value,
}

/// Broadcast-based bus for local real-time dispatch. Every connection task
/// subscribes once and filters by its bound room.
#[derive(Clone)]
pub struct RoomEventBus {
    sender: broadcast::Sender<RoomEvent>,
}

impl RoomEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: RoomEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.sender.subscribe()
    }

    /// Helper: publish a typed event for a room.
    pub fn dispatch(&self, kind: EventKind, room_code: &str, payload: serde_json::Value) {
        self.publish(RoomEvent {
            kind,
            room_code: room_code.to_string(),
            payload,
        });
    }
}

impl Default for RoomEventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

/// Handlers for events arriving from other processes. Every kind re-emits to
/// the local bus; `sessionEnded` additionally drops this process's local
/// bindings for the room, since the room is no longer live anywhere.
pub fn remote_event_registry(state: &AppState) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for kind in EventKind::ALL {
        let state = state.clone();
        registry = registry.on(kind, move |message: FanoutMessage| {
            let FanoutMessage {
                kind,
                room_code,
                data,
                origin_process_id,
                ..
            } = message;
            tracing::debug!(
                room_code = %room_code,
                kind = kind.as_str(),
                origin = %origin_process_id,
                "re-emitting remote event locally"
            );
            if kind == EventKind::SessionEnded {
                let cleared = state.registry.clear_room(&room_code);
                if cleared > 0 {
                    tracing::info!(
                        room_code = %room_code,
                        cleared,
                        "session ended remotely; cleared local bindings"
                    );
                }
            }
            state.event_bus.dispatch(kind, &room_code, data);
        });
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_dispatched_events() {
        let bus = RoomEventBus::default();
        let mut rx = bus.subscribe();

        bus.dispatch(
            EventKind::NewMessage,
            "ABC123",
            serde_json::json!({"id": 1}),
        );

        let event = rx.recv().await.expect("event");
        assert_eq!(event.kind, EventKind::NewMessage);
        assert_eq!(event.room_code, "ABC123");
        assert_eq!(event.payload["id"], 1);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let bus = RoomEventBus::default();
        bus.dispatch(EventKind::UserLeft, "ABC123", serde_json::json!({}));
    }
}
