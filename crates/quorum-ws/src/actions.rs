use axum::extract::ws::Message;
use futures_util::SinkExt;
use serde::Serialize;

use quorum_core::{question as question_ops, room as room_ops, AppState, CoreError};
use quorum_db::{rooms, users};
use quorum_models::gateway::{
    ClientAction, EndSessionPayload, ErrorAck, EventKind, JoinRoomError, JoinRoomPayload,
    JoinRoomSuccess, LeaveRoomPayload, LeaveRoomSuccess, MarkAsAnsweredPayload, MessagePayload,
    PresenceChange, QuestionAnswered, SessionEnded, VotePayload, ACK_JOIN_ROOM_ERROR,
    ACK_JOIN_ROOM_SUCCESS, ACK_LEAVE_ROOM_SUCCESS, ACK_MARK_AS_ANSWERED_ERROR, ACK_MESSAGE_ERROR,
    ACK_SESSION_END_ERROR, ACK_VOTE_ERROR,
};
use quorum_models::RoomParticipant;

use crate::handler::send_event;
use crate::session::Session;

pub(crate) async fn handle_action(
    state: &AppState,
    session: &mut Session,
    action: ClientAction,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    match action {
        ClientAction::JoinRoom(payload) => join_room(state, session, payload, sender).await,
        ClientAction::LeaveRoom(payload) => leave_room(state, session, payload, sender).await,
        ClientAction::Message(payload) => post_question(state, payload, sender).await,
        ClientAction::Vote(payload) => toggle_vote(state, payload, sender).await,
        ClientAction::MarkAsAnswered(payload) => mark_as_answered(state, payload, sender).await,
        ClientAction::EndSession(payload) => end_session(state, payload, sender).await,
    }
}

/// Deliver an event to this process's connections immediately, then queue
/// the cross-process publication. Local delivery never waits on the fan-out
/// path; the publish either fully forms the event or drops it.
fn broadcast(state: &AppState, room_code: &str, kind: EventKind, payload: &impl Serialize) {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(room_code, kind = kind.as_str(), error = %err, "failed to serialize broadcast payload");
            return;
        }
    };
    state.event_bus.dispatch(kind, room_code, value.clone());
    state.fanout.publish(room_code, kind, value);
}

/// Cluster-wide participant count and list. Presence-store read failures
/// past the validation phase degrade to an empty view with a warning; they
/// never abort the action.
async fn presence_snapshot(state: &AppState, room_code: &str) -> (i64, Vec<RoomParticipant>) {
    let participant_count = match state.fanout.count_participants(room_code).await {
        Ok(count) => count,
        Err(err) => {
            tracing::warn!(room_code, error = %err, "failed to count participants");
            0
        }
    };
    let participants = match state.fanout.list_participants(room_code).await {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(room_code, error = %err, "failed to list participants");
            Vec::new()
        }
    };
    (participant_count, participants)
}

async fn join_room(
    state: &AppState,
    session: &mut Session,
    payload: JoinRoomPayload,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    tracing::info!(
        user_id = payload.user_id,
        room_code = %payload.room_code,
        "join requested"
    );

    let room = match room_ops::find_joinable_room(&state.db, &payload.room_code).await {
        Ok(room) => room,
        Err(err) => {
            let message = match err {
                CoreError::RoomNotFound => "Room not found",
                CoreError::RoomInactive => "Room is not active",
                other => {
                    tracing::error!(room_code = %payload.room_code, error = %other, "join validation failed");
                    "Failed to join room"
                }
            };
            let _ = send_event(
                sender,
                ACK_JOIN_ROOM_ERROR,
                &JoinRoomError {
                    message: message.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let user = match users::get_user_by_id(&state.db, payload.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            let _ = send_event(
                sender,
                ACK_JOIN_ROOM_ERROR,
                &JoinRoomError {
                    message: "User not found".to_string(),
                },
            )
            .await;
            return;
        }
        Err(err) => {
            tracing::error!(user_id = payload.user_id, error = %err, "user lookup failed");
            let _ = send_event(
                sender,
                ACK_JOIN_ROOM_ERROR,
                &JoinRoomError {
                    message: "Failed to join room".to_string(),
                },
            )
            .await;
            return;
        }
    };

    // A join while bound elsewhere supersedes the old binding.
    if let Some(previous) = session.room_code.clone() {
        if previous != room.code {
            if let Some(removed) =
                state
                    .registry
                    .unbind(&previous, &session.connection_id, session.user_id)
            {
                broadcast_departure(state, &previous, removed).await;
            }
            session.unbind();
        }
    }

    let participant = user.participant();
    let stale = state
        .registry
        .bind(&room.code, &session.connection_id, participant.clone());
    if !stale.is_empty() {
        tracing::debug!(
            room_code = %room.code,
            user_id = participant.id,
            stale = stale.len(),
            "dropped stale bindings for reconnecting user"
        );
    }
    session.bind(&room.code, participant.id);

    if let Err(err) = state.fanout.add_participant(&room.code, &participant).await {
        tracing::warn!(room_code = %room.code, error = %err, "failed to upsert presence");
    }

    // Best-effort persisted membership; presence and the relation may
    // transiently diverge.
    if let Err(err) = rooms::add_participant(&state.db, room.id, participant.id).await {
        tracing::warn!(room_code = %room.code, user_id = participant.id, error = %err, "failed to persist participant");
    }

    let (participant_count, participants) = presence_snapshot(state, &room.code).await;

    broadcast(
        state,
        &room.code,
        EventKind::UserJoined,
        &PresenceChange {
            user: participant.clone(),
            participant_count,
            participants: participants.clone(),
        },
    );

    let _ = send_event(
        sender,
        ACK_JOIN_ROOM_SUCCESS,
        &JoinRoomSuccess {
            room_id: room.code.clone(),
            participant_count,
            participants,
        },
    )
    .await;

    tracing::info!(user_id = participant.id, room_code = %room.code, "join succeeded");
}

/// Shared tail of every leave path (explicit leave, disconnect, superseded
/// binding): presence removal, `userLeft` broadcast with the updated
/// cluster view, and best-effort upkeep of the persisted relation.
async fn broadcast_departure(state: &AppState, room_code: &str, participant: RoomParticipant) {
    if let Err(err) = state.fanout.remove_participant(room_code, participant.id).await {
        tracing::warn!(room_code, user_id = participant.id, error = %err, "failed to remove presence");
    }

    let (participant_count, participants) = presence_snapshot(state, room_code).await;
    broadcast(
        state,
        room_code,
        EventKind::UserLeft,
        &PresenceChange {
            user: participant.clone(),
            participant_count,
            participants,
        },
    );

    // The room may already be gone (ended session); a failure here only
    // means presence and persisted membership diverge until cleanup.
    match rooms::get_room_by_code(&state.db, room_code).await {
        Ok(Some(room)) => {
            if let Err(err) = rooms::remove_participant(&state.db, room.id, participant.id).await {
                tracing::warn!(room_code, user_id = participant.id, error = %err, "failed to remove persisted participant");
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(room_code, error = %err, "room lookup failed during departure");
        }
    }
}

async fn leave_room(
    state: &AppState,
    session: &mut Session,
    payload: LeaveRoomPayload,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    let removed = state.registry.unbind(
        &payload.room_code,
        &session.connection_id,
        Some(payload.user_id),
    );
    if let Some(participant) = removed {
        broadcast_departure(state, &payload.room_code, participant).await;
    }
    if session.room_code.as_deref() == Some(payload.room_code.as_str()) {
        session.unbind();
    }

    let _ = send_event(
        sender,
        ACK_LEAVE_ROOM_SUCCESS,
        &LeaveRoomSuccess {
            room_id: payload.room_code.clone(),
        },
    )
    .await;

    tracing::info!(user_id = payload.user_id, room_code = %payload.room_code, "left room");
}

/// Implicit leave when the transport drops. Idempotent: the connection was
/// bound to at most one room.
pub(crate) async fn handle_disconnect(state: &AppState, session: &Session) {
    if let Some((room_code, participant)) =
        state.registry.unbind_connection(&session.connection_id)
    {
        tracing::info!(
            connection_id = %session.connection_id,
            user_id = participant.id,
            room_code = %room_code,
            "disconnect treated as leave"
        );
        broadcast_departure(state, &room_code, participant).await;
    }
}

async fn post_question(
    state: &AppState,
    payload: MessagePayload,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    match question_ops::post_question(
        &state.db,
        state.config.worker_id,
        &payload.content,
        &payload.room_code,
        payload.user_id,
    )
    .await
    {
        Ok(question) => {
            tracing::info!(question_id = question.id, room_code = %payload.room_code, "question posted");
            broadcast(state, &payload.room_code, EventKind::NewMessage, &question);
        }
        Err(CoreError::RoomNotFound) => {
            let _ = send_event(
                sender,
                ACK_MESSAGE_ERROR,
                &ErrorAck {
                    error: "Room not found".to_string(),
                    details: None,
                },
            )
            .await;
        }
        Err(err) => {
            tracing::error!(room_code = %payload.room_code, error = %err, "failed to create question");
            let _ = send_event(
                sender,
                ACK_MESSAGE_ERROR,
                &ErrorAck {
                    error: "Failed to create question".to_string(),
                    details: Some(err.to_string()),
                },
            )
            .await;
        }
    }
}

async fn toggle_vote(
    state: &AppState,
    payload: VotePayload,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    match state
        .votes
        .toggle(
            &state.db,
            state.config.worker_id,
            payload.question_id,
            payload.user_id,
        )
        .await
    {
        Ok(update) => {
            tracing::info!(
                question_id = payload.question_id,
                user_id = payload.user_id,
                vote_count = update.vote_count,
                action = ?update.action,
                "vote toggled"
            );
            broadcast(state, &payload.room_code, EventKind::VoteUpdated, &update);
        }
        Err(err) => {
            tracing::error!(question_id = payload.question_id, error = %err, "failed to process vote");
            let _ = send_event(
                sender,
                ACK_VOTE_ERROR,
                &ErrorAck {
                    error: "Failed to process vote".to_string(),
                    details: Some(err.to_string()),
                },
            )
            .await;
        }
    }
}

async fn mark_as_answered(
    state: &AppState,
    payload: MarkAsAnsweredPayload,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    match room_ops::require_admin(&state.db, &payload.room_code, payload.user_id).await {
        Ok(_) => {}
        Err(CoreError::RoomNotFound | CoreError::Unauthorized(_)) => {
            let _ = send_event(
                sender,
                ACK_MARK_AS_ANSWERED_ERROR,
                &ErrorAck {
                    error: "Unauthorized: Only room admin can mark questions as answered"
                        .to_string(),
                    details: Some(
                        "You must be the room creator to mark questions as answered".to_string(),
                    ),
                },
            )
            .await;
            return;
        }
        Err(err) => {
            tracing::error!(room_code = %payload.room_code, error = %err, "admin check failed");
            let _ = send_event(
                sender,
                ACK_MARK_AS_ANSWERED_ERROR,
                &ErrorAck {
                    error: "Failed to mark question as answered".to_string(),
                    details: Some(err.to_string()),
                },
            )
            .await;
            return;
        }
    }

    match question_ops::mark_answered(&state.db, payload.question_id).await {
        Ok(question) => {
            tracing::info!(question_id = question.id, room_code = %payload.room_code, "question marked answered");
            broadcast(
                state,
                &payload.room_code,
                EventKind::QuestionAnswered,
                &QuestionAnswered {
                    question_id: question.id,
                    is_answered: question.is_answered,
                    question,
                },
            );
        }
        Err(err) => {
            tracing::error!(question_id = payload.question_id, error = %err, "failed to mark question answered");
            let _ = send_event(
                sender,
                ACK_MARK_AS_ANSWERED_ERROR,
                &ErrorAck {
                    error: "Failed to mark question as answered".to_string(),
                    details: Some(err.to_string()),
                },
            )
            .await;
        }
    }
}

async fn end_session(
    state: &AppState,
    payload: EndSessionPayload,
    sender: &mut (impl SinkExt<Message> + Unpin),
) {
    let room = match room_ops::require_admin(&state.db, &payload.room_code, payload.user_id).await
    {
        Ok(room) => room,
        Err(CoreError::RoomNotFound | CoreError::Unauthorized(_)) => {
            let _ = send_event(
                sender,
                ACK_SESSION_END_ERROR,
                &ErrorAck {
                    error: "Unauthorized: Only room admin can end session".to_string(),
                    details: Some("You must be the room creator to end the session".to_string()),
                },
            )
            .await;
            return;
        }
        Err(err) => {
            tracing::error!(room_code = %payload.room_code, error = %err, "admin check failed");
            let _ = send_event(
                sender,
                ACK_SESSION_END_ERROR,
                &ErrorAck {
                    error: "Failed to end session".to_string(),
                    details: Some(err.to_string()),
                },
            )
            .await;
            return;
        }
    };

    let ended_by = match users::get_user_by_id(&state.db, payload.user_id).await {
        Ok(Some(user)) => user.participant(),
        Ok(None) => {
            let _ = send_event(
                sender,
                ACK_SESSION_END_ERROR,
                &ErrorAck {
                    error: "User not found".to_string(),
                    details: None,
                },
            )
            .await;
            return;
        }
        Err(err) => {
            tracing::error!(user_id = payload.user_id, error = %err, "user lookup failed");
            let _ = send_event(
                sender,
                ACK_SESSION_END_ERROR,
                &ErrorAck {
                    error: "Failed to end session".to_string(),
                    details: Some(err.to_string()),
                },
            )
            .await;
            return;
        }
    };

    // Invariant: the session-ended notice goes out before any cleanup.
    // Clients must stop treating the room as live even when the cleanup
    // below is slow or fails; nothing past this point rolls it back.
    broadcast(
        state,
        &room.code,
        EventKind::SessionEnded,
        &SessionEnded {
            room_code: room.code.clone(),
            ended_by: ended_by.clone(),
            message: format!("Session ended by {}", ended_by.display_name()),
        },
    );

    let cleared = state.registry.clear_room(&room.code);
    tracing::info!(room_code = %room.code, cleared, "cleared local bindings for ended session");

    if let Err(err) = state.fanout.delete_room_presence(&room.code).await {
        tracing::warn!(room_code = %room.code, error = %err, "failed to delete room presence");
    }

    if let Err(err) = rooms::delete_room_and_questions(&state.db, room.id).await {
        tracing::error!(room_code = %room.code, error = %err, "failed to delete ended room from database");
    }

    tracing::info!(room_code = %room.code, ended_by = ended_by.id, "session ended");
}
