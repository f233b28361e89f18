use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::RoomParticipant;

/// Condensed room shape nested inside a hydrated question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: i64,
    pub code: String,
    pub title: String,
}

/// A fully-hydrated question as broadcast in `newMessage` and
/// `questionAnswered` payloads: the row fields plus the author's public
/// shape and a room summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub content: String,
    pub vote_count: i64,
    pub is_answered: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: i64,
    pub room_id: i64,
    pub user: RoomParticipant,
    pub room: RoomSummary,
}
