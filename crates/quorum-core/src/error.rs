use thiserror::Error;

/// Error taxonomy for gateway operations. The first four classes are always
/// recovered locally and turned into a typed ack for the offending
/// connection; `Database` failures during validation abort the action, while
/// failures during post-broadcast cleanup are logged and swallowed by the
/// caller.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] quorum_util::validation::ValidationError),
    #[error("room not found")]
    RoomNotFound,
    #[error("room is not active")]
    RoomInactive,
    #[error("user not found")]
    UserNotFound,
    #[error("question not found")]
    QuestionNotFound,
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] quorum_db::DbError),
}
