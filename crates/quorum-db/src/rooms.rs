use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_ended: bool,
    pub admin_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

const ROOM_COLUMNS: &str =
    "id, code, title, description, is_active, is_ended, admin_id, created_at, updated_at, ended_at";

impl RoomRow {
    /// A room accepts joins only while active and not yet ended.
    pub fn is_joinable(&self) -> bool {
        self.is_active && !self.is_ended
    }
}

pub async fn create_room(
    pool: &DbPool,
    id: i64,
    code: &str,
    title: &str,
    description: Option<&str>,
    admin_id: i64,
) -> Result<RoomRow, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(&format!(
        "INSERT INTO rooms (id, code, title, description, admin_id)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING {ROOM_COLUMNS}"
    ))
    .bind(id)
    .bind(code)
    .bind(title)
    .bind(description)
    .bind(admin_id)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        if crate::is_unique_violation(&err) {
            DbError::Conflict
        } else {
            DbError::Sqlx(err)
        }
    })?;
    Ok(row)
}

pub async fn get_room_by_code(pool: &DbPool, code: &str) -> Result<Option<RoomRow>, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(&format!(
        "SELECT {ROOM_COLUMNS} FROM rooms WHERE code = ?1"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Idempotent set-membership add on the persisted participant relation.
pub async fn add_participant(pool: &DbPool, room_id: i64, user_id: i64) -> Result<(), DbError> {
    sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING")
        .bind(room_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_participant(pool: &DbPool, room_id: i64, user_id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM room_participants WHERE room_id = ?1 AND user_id = ?2")
        .bind(room_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_participant_user_ids(pool: &DbPool, room_id: i64) -> Result<Vec<i64>, DbError> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT user_id FROM room_participants WHERE room_id = ?1 ORDER BY joined_at ASC")
            .bind(room_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Delete a room together with its questions, their votes, and its
/// participant relation, in one transaction. Used when a session ends.
pub async fn delete_room_and_questions(pool: &DbPool, room_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM votes WHERE question_id IN (SELECT id FROM questions WHERE room_id = ?1)")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM questions WHERE room_id = ?1")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM room_participants WHERE room_id = ?1")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM rooms WHERE id = ?1")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
