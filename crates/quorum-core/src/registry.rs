use std::collections::HashMap;

use dashmap::DashMap;
use quorum_models::RoomParticipant;

/// Local connection↔room bindings. This is a per-process cache only:
/// participant counts and lists shown to clients come from the shared
/// presence store, which stays authoritative across processes.
///
/// Owned by the gateway instance and passed explicitly to every handler
/// that needs it; constructed at process start, dropped at shutdown.
#[derive(Default)]
pub struct RoomRegistry {
    /// room code -> (connection id -> participant)
    rooms: DashMap<String, HashMap<String, RoomParticipant>>,
    /// connection id -> room code (a connection binds to at most one room)
    connections: DashMap<String, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a room. Any stale binding for the same user in
    /// that room (a rapid reconnect) is dropped first; the stale connection
    /// ids are returned.
    pub fn bind(
        &self,
        room_code: &str,
        connection_id: &str,
        participant: RoomParticipant,
    ) -> Vec<String> {
        let mut room = self.rooms.entry(room_code.to_string()).or_default();
        let stale: Vec<String> = room
            .iter()
            .filter(|(conn, existing)| {
                existing.id == participant.id && conn.as_str() != connection_id
            })
            .map(|(conn, _)| conn.clone())
            .collect();
        for conn in &stale {
            room.remove(conn);
            self.connections.remove(conn);
        }
        room.insert(connection_id.to_string(), participant);
        drop(room);

        self.connections
            .insert(connection_id.to_string(), room_code.to_string());
        stale
    }

    /// Remove a binding matched by connection identity or, when supplied, by
    /// user id. Returns the removed participant if a removal actually
    /// occurred. An emptied room entry is discarded (the cluster presence is
    /// untouched; other processes may still hold participants).
    pub fn unbind(
        &self,
        room_code: &str,
        connection_id: &str,
        user_id: Option<i64>,
    ) -> Option<RoomParticipant> {
        let mut removed = None;
        if let Some(mut room) = self.rooms.get_mut(room_code) {
            let matches: Vec<String> = room
                .iter()
                .filter(|(conn, participant)| {
                    conn.as_str() == connection_id || user_id == Some(participant.id)
                })
                .map(|(conn, _)| conn.clone())
                .collect();
            for conn in matches {
                if let Some(participant) = room.remove(&conn) {
                    removed = Some(participant);
                }
                self.connections.remove(&conn);
            }
        }
        self.rooms
            .remove_if(room_code, |_, bindings| bindings.is_empty());
        removed
    }

    /// Implicit leave on transport disconnect: drops the connection's
    /// binding wherever it is. Idempotent; affects at most one room.
    pub fn unbind_connection(&self, connection_id: &str) -> Option<(String, RoomParticipant)> {
        let (_, room_code) = self.connections.remove(connection_id)?;
        let mut removed = None;
        if let Some(mut room) = self.rooms.get_mut(&room_code) {
            removed = room.remove(connection_id);
        }
        self.rooms
            .remove_if(&room_code, |_, bindings| bindings.is_empty());
        removed.map(|participant| (room_code, participant))
    }

    /// Drop every local binding for a room (session ended).
    pub fn clear_room(&self, room_code: &str) -> usize {
        let Some((_, bindings)) = self.rooms.remove(room_code) else {
            return 0;
        };
        for conn in bindings.keys() {
            self.connections.remove(conn);
        }
        bindings.len()
    }

    /// Rooms this process currently serves; drives the stale-presence sweep.
    pub fn room_codes(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn local_count(&self, room_code: &str) -> usize {
        self.rooms
            .get(room_code)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    pub fn room_of(&self, connection_id: &str) -> Option<String> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }
}
