use quorum_db::{questions, rooms, DbPool};
use quorum_models::Question;
use quorum_util::{snowflake, validation};

use crate::error::CoreError;

/// Persist a new question for a room and return it fully hydrated (author
/// public fields plus room summary) for broadcast.
pub async fn post_question(
    db: &DbPool,
    worker_id: u16,
    content: &str,
    room_code: &str,
    user_id: i64,
) -> Result<Question, CoreError> {
    validation::validate_question_content(content)?;

    let room = rooms::get_room_by_code(db, room_code)
        .await?
        .ok_or(CoreError::RoomNotFound)?;

    let created = questions::create_question(
        db,
        snowflake::generate(worker_id),
        content,
        room.id,
        user_id,
    )
    .await?;

    let detail = questions::get_question_detail(db, created.id)
        .await?
        .ok_or(CoreError::QuestionNotFound)?;
    Ok(detail.into_model())
}

/// Flip a question's answered flag and return the updated hydrated record.
/// Authorization happens at the call site via `room::require_admin`.
pub async fn mark_answered(db: &DbPool, question_id: i64) -> Result<Question, CoreError> {
    match questions::mark_answered(db, question_id).await {
        Ok(()) => {}
        Err(quorum_db::DbError::NotFound) => return Err(CoreError::QuestionNotFound),
        Err(err) => return Err(err.into()),
    }
    let detail = questions::get_question_detail(db, question_id)
        .await?
        .ok_or(CoreError::QuestionNotFound)?;
    Ok(detail.into_model())
}
