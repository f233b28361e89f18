use quorum_db::rooms::{self, RoomRow};
use quorum_db::{users, DbError, DbPool};
use quorum_util::{room_code, snowflake, validation};

use crate::error::CoreError;

/// Single authorization predicate for admin-gated operations. Re-verified
/// server-side on every call; never inferred from prior connection state.
pub fn is_room_admin(room: &RoomRow, user_id: i64) -> bool {
    room.admin_id == user_id
}

/// Look up a room for joining: it must exist, be active, and not be ended.
pub async fn find_joinable_room(db: &DbPool, code: &str) -> Result<RoomRow, CoreError> {
    let room = rooms::get_room_by_code(db, code)
        .await?
        .ok_or(CoreError::RoomNotFound)?;
    if !room.is_joinable() {
        return Err(CoreError::RoomInactive);
    }
    Ok(room)
}

/// Look up a room and require that `user_id` is its admin.
pub async fn require_admin(db: &DbPool, code: &str, user_id: i64) -> Result<RoomRow, CoreError> {
    let room = rooms::get_room_by_code(db, code)
        .await?
        .ok_or(CoreError::RoomNotFound)?;
    if !is_room_admin(&room, user_id) {
        return Err(CoreError::Unauthorized(
            "only the room admin may perform this action",
        ));
    }
    Ok(room)
}

const CODE_GENERATION_ATTEMPTS: usize = 8;

/// Create a room with a freshly generated shareable code, retrying on the
/// (unlikely) code collision.
pub async fn create_room(
    db: &DbPool,
    worker_id: u16,
    title: &str,
    description: Option<&str>,
    admin_id: i64,
) -> Result<RoomRow, CoreError> {
    validation::validate_room_title(title)?;
    users::get_user_by_id(db, admin_id)
        .await?
        .ok_or(CoreError::UserNotFound)?;

    for _ in 0..CODE_GENERATION_ATTEMPTS {
        let code = room_code::generate();
        match rooms::create_room(
            db,
            snowflake::generate(worker_id),
            &code,
            title,
            description,
            admin_id,
        )
        .await
        {
            Ok(room) => return Ok(room),
            Err(DbError::Conflict) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(CoreError::Conflict(
        "could not generate a unique room code".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_db::{create_pool, run_migrations};

    async fn seeded_pool() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        users::create_user(&pool, 1, "Rosa", "Diaz", "rosa@example.com", None)
            .await
            .expect("admin");
        pool
    }

    #[tokio::test]
    async fn created_rooms_are_joinable_and_admin_gated() {
        let pool = seeded_pool().await;
        let room = create_room(&pool, 1, "All hands", None, 1)
            .await
            .expect("room");
        assert!(room_code::is_valid_format(&room.code));

        let found = find_joinable_room(&pool, &room.code).await.expect("find");
        assert!(is_room_admin(&found, 1));
        assert!(!is_room_admin(&found, 2));

        require_admin(&pool, &room.code, 1).await.expect("admin ok");
        let err = require_admin(&pool, &room.code, 2)
            .await
            .expect_err("non-admin rejected");
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn join_lookup_distinguishes_missing_from_inactive() {
        let pool = seeded_pool().await;
        let err = find_joinable_room(&pool, "NOPE42").await.expect_err("missing");
        assert!(matches!(err, CoreError::RoomNotFound));

        let room = create_room(&pool, 1, "All hands", None, 1)
            .await
            .expect("room");
        sqlx::query("UPDATE rooms SET is_ended = TRUE WHERE id = ?1")
            .bind(room.id)
            .execute(&pool)
            .await
            .expect("end room");
        let err = find_joinable_room(&pool, &room.code)
            .await
            .expect_err("ended room rejects joins");
        assert!(matches!(err, CoreError::RoomInactive));
    }

    #[tokio::test]
    async fn create_room_requires_an_existing_admin() {
        let pool = seeded_pool().await;
        let err = create_room(&pool, 1, "Ghost room", None, 99)
            .await
            .expect_err("unknown admin");
        assert!(matches!(err, CoreError::UserNotFound));
    }
}
