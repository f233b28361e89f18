use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::question::Question;
use crate::user::RoomParticipant;

/// Closed set of events that travel between processes and down to clients.
/// The serialized names are the client-facing event names; a payload's shape
/// is fully determined by its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NewMessage,
    VoteUpdated,
    QuestionAnswered,
    UserJoined,
    UserLeft,
    SessionEnded,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::NewMessage,
        EventKind::VoteUpdated,
        EventKind::QuestionAnswered,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::SessionEnded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewMessage => "newMessage",
            EventKind::VoteUpdated => "voteUpdated",
            EventKind::QuestionAnswered => "questionAnswered",
            EventKind::UserJoined => "userJoined",
            EventKind::UserLeft => "userLeft",
            EventKind::SessionEnded => "sessionEnded",
        }
    }
}

// Error acks, delivered only to the originating connection.
pub const ACK_JOIN_ROOM_SUCCESS: &str = "joinRoomSuccess";
pub const ACK_JOIN_ROOM_ERROR: &str = "joinRoomError";
pub const ACK_LEAVE_ROOM_SUCCESS: &str = "leaveRoomSuccess";
pub const ACK_MESSAGE_ERROR: &str = "messageError";
pub const ACK_VOTE_ERROR: &str = "voteError";
pub const ACK_SESSION_END_ERROR: &str = "sessionEndError";
pub const ACK_MARK_AS_ANSWERED_ERROR: &str = "markAsAnsweredError";

/// Envelope published on the per-room pub/sub channel. `origin_process_id`
/// lets every subscriber drop its own echoes; `timestamp` is epoch millis at
/// publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub room_code: String,
    pub data: Value,
    pub origin_process_id: String,
    pub timestamp: i64,
}

/// Inbound client actions, one frame per action:
/// `{ "action": "...", "data": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientAction {
    JoinRoom(JoinRoomPayload),
    LeaveRoom(LeaveRoomPayload),
    Message(MessagePayload),
    Vote(VotePayload),
    MarkAsAnswered(MarkAsAnsweredPayload),
    EndSession(EndSessionPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub room_code: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomPayload {
    pub room_code: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub content: String,
    pub room_code: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub question_id: i64,
    pub room_code: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsAnsweredPayload {
    pub question_id: i64,
    pub room_code: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionPayload {
    pub room_code: String,
    pub user_id: i64,
}

/// Payload for `userJoined` and `userLeft`: the user in question plus the
/// cluster-wide participant count and list sourced from the presence store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user: RoomParticipant,
    pub participant_count: i64,
    pub participants: Vec<RoomParticipant>,
}

/// Ack sent to the joining connection on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomSuccess {
    pub room_id: String,
    pub participant_count: i64,
    pub participants: Vec<RoomParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomSuccess {
    pub room_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdate {
    pub question_id: i64,
    pub user_id: i64,
    pub vote_count: i64,
    pub has_voted: bool,
    pub action: VoteAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswered {
    pub question_id: i64,
    pub is_answered: bool,
    pub question: Question,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnded {
    pub room_code: String,
    pub ended_by: RoomParticipant,
    pub message: String,
}

/// `{ message }` ack used by `joinRoomError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomError {
    pub message: String,
}

/// `{ error, details? }` ack used by the remaining error events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAck {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_through_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: EventKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn fanout_envelope_uses_camel_case_keys() {
        let msg = FanoutMessage {
            kind: EventKind::UserJoined,
            room_code: "ABC123".to_string(),
            data: serde_json::json!({"participantCount": 1}),
            origin_process_id: "server-1".to_string(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "userJoined");
        assert_eq!(json["roomCode"], "ABC123");
        assert_eq!(json["originProcessId"], "server-1");
        assert_eq!(json["data"]["participantCount"], 1);
    }

    #[test]
    fn unknown_event_kind_fails_to_parse() {
        let err = serde_json::from_str::<EventKind>("\"roomRenamed\"");
        assert!(err.is_err());
    }

    #[test]
    fn client_action_parses_tagged_frames() {
        let frame = r#"{"action":"joinRoom","data":{"roomCode":"ABC123","userId":2}}"#;
        let action: ClientAction = serde_json::from_str(frame).unwrap();
        match action {
            ClientAction::JoinRoom(p) => {
                assert_eq!(p.room_code, "ABC123");
                assert_eq!(p.user_id, 2);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn vote_action_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&VoteAction::Added).unwrap(),
            "\"added\""
        );
        assert_eq!(
            serde_json::to_string(&VoteAction::Removed).unwrap(),
            "\"removed\""
        );
    }

    #[test]
    fn error_ack_omits_missing_details() {
        let ack = ErrorAck {
            error: "Failed to process vote".to_string(),
            details: None,
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert!(json.get("details").is_none());
    }
}
