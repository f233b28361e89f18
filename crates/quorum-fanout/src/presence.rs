use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use quorum_models::RoomParticipant;

use crate::client::{FanoutClient, FanoutError};

/// Soft TTL on each per-room participant hash; refreshed on every upsert.
/// Bounds growth if cleanup logic never runs for a room.
pub const PRESENCE_TTL_SECONDS: i64 = 3600;

/// Default eviction threshold for the stale sweep, matching the original
/// five-minute window.
pub const DEFAULT_STALE_MAX_AGE: Duration = Duration::from_secs(300);

fn presence_key(room_code: &str) -> String {
    format!("room:{room_code}:participants")
}

/// Stored hash value: the participant's public fields plus store-internal
/// bookkeeping. The internal fields are stripped before anything is returned
/// to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEntry {
    #[serde(flatten)]
    pub user: RoomParticipant,
    pub origin_process_id: String,
    pub last_seen: i64,
}

impl FanoutClient {
    /// Upsert a participant into the room's presence hash and refresh the
    /// hash TTL.
    pub async fn add_participant(
        &self,
        room_code: &str,
        user: &RoomParticipant,
    ) -> Result<(), FanoutError> {
        let entry = ParticipantEntry {
            user: user.clone(),
            origin_process_id: self.origin_process_id().to_string(),
            last_seen: chrono::Utc::now().timestamp_millis(),
        };
        let key = presence_key(room_code);
        let value = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(&key, user.id, value).await?;
        conn.expire::<_, ()>(&key, PRESENCE_TTL_SECONDS).await?;
        Ok(())
    }

    pub async fn remove_participant(
        &self,
        room_code: &str,
        user_id: i64,
    ) -> Result<(), FanoutError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(presence_key(room_code), user_id)
            .await?;
        Ok(())
    }

    /// All participants currently present in the room, across every server
    /// process, with store-internal fields stripped.
    pub async fn list_participants(
        &self,
        room_code: &str,
    ) -> Result<Vec<RoomParticipant>, FanoutError> {
        let mut conn = self.conn.clone();
        let raw: std::collections::HashMap<String, String> =
            conn.hgetall(presence_key(room_code)).await?;
        let mut participants = Vec::with_capacity(raw.len());
        for (field, value) in raw {
            match serde_json::from_str::<ParticipantEntry>(&value) {
                Ok(entry) => participants.push(entry.user),
                Err(err) => {
                    tracing::warn!(room_code, field = %field, error = %err, "corrupt presence entry");
                }
            }
        }
        participants.sort_by_key(|p| p.id);
        Ok(participants)
    }

    pub async fn count_participants(&self, room_code: &str) -> Result<i64, FanoutError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.hlen(presence_key(room_code)).await?;
        Ok(count)
    }

    /// Drop the entire presence hash; used when a session ends.
    pub async fn delete_room_presence(&self, room_code: &str) -> Result<(), FanoutError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(presence_key(room_code)).await?;
        Ok(())
    }

    /// Evict entries whose `last_seen` is older than `max_age`. Defends
    /// against connections that vanished without a disconnect notification
    /// reaching any process. Returns the number of evicted entries.
    pub async fn cleanup_stale(
        &self,
        room_code: &str,
        max_age: Duration,
    ) -> Result<usize, FanoutError> {
        let key = presence_key(room_code);
        let mut conn = self.conn.clone();
        let raw: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age.as_millis() as i64;

        let mut evicted = 0;
        for (field, value) in raw {
            let stale = match serde_json::from_str::<ParticipantEntry>(&value) {
                Ok(entry) => entry.last_seen < cutoff,
                // Entries we cannot parse are garbage; sweep them too.
                Err(_) => true,
            };
            if stale {
                conn.hdel::<_, _, ()>(&key, &field).await?;
                evicted += 1;
                tracing::info!(room_code, field = %field, "evicted stale participant");
            }
        }
        Ok(evicted)
    }
}
