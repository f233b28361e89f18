use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn find_vote(
    pool: &DbPool,
    question_id: i64,
    user_id: i64,
) -> Result<Option<VoteRow>, DbError> {
    let row = sqlx::query_as::<_, VoteRow>(
        "SELECT id, user_id, question_id, created_at
         FROM votes WHERE question_id = ?1 AND user_id = ?2",
    )
    .bind(question_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The (user_id, question_id) pair is unique at the schema level; a race
/// that inserts twice surfaces as `DbError::Conflict` rather than a double
/// count.
pub async fn create_vote(
    pool: &DbPool,
    id: i64,
    question_id: i64,
    user_id: i64,
) -> Result<VoteRow, DbError> {
    let row = sqlx::query_as::<_, VoteRow>(
        "INSERT INTO votes (id, question_id, user_id)
         VALUES (?1, ?2, ?3)
         RETURNING id, user_id, question_id, created_at",
    )
    .bind(id)
    .bind(question_id)
    .bind(user_id)
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

pub async fn delete_vote(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM votes WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_for_question(pool: &DbPool, question_id: i64) -> Result<i64, DbError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM votes WHERE question_id = ?1")
        .bind(question_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn has_user_voted(
    pool: &DbPool,
    question_id: i64,
    user_id: i64,
) -> Result<bool, DbError> {
    Ok(find_vote(pool, question_id, user_id).await?.is_some())
}
