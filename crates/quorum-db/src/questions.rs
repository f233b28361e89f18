use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use quorum_models::{Question, RoomParticipant, RoomSummary};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub content: String,
    pub vote_count: i64,
    pub is_answered: bool,
    pub is_deleted: bool,
    pub user_id: i64,
    pub room_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question joined with its author's public fields and a room summary,
/// ready to hydrate the broadcast payload.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionDetailRow {
    pub id: i64,
    pub content: String,
    pub vote_count: i64,
    pub is_answered: bool,
    pub is_deleted: bool,
    pub user_id: i64,
    pub room_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_first_name: String,
    pub author_last_name: String,
    pub author_avatar_url: Option<String>,
    pub room_code: String,
    pub room_title: String,
}

impl QuestionDetailRow {
    pub fn into_model(self) -> Question {
        Question {
            id: self.id,
            content: self.content,
            vote_count: self.vote_count,
            is_answered: self.is_answered,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
            user_id: self.user_id,
            room_id: self.room_id,
            user: RoomParticipant {
                id: self.user_id,
                first_name: self.author_first_name,
                last_name: self.author_last_name,
                avatar_url: self.author_avatar_url,
            },
            room: RoomSummary {
                id: self.room_id,
                code: self.room_code,
                title: self.room_title,
            },
        }
    }
}

const QUESTION_COLUMNS: &str =
    "id, content, vote_count, is_answered, is_deleted, user_id, room_id, created_at, updated_at";

const DETAIL_QUERY: &str = "SELECT q.id, q.content, q.vote_count, q.is_answered, q.is_deleted, q.user_id, q.room_id, q.created_at, q.updated_at,
        u.first_name AS author_first_name, u.last_name AS author_last_name, u.avatar_url AS author_avatar_url,
        r.code AS room_code, r.title AS room_title
 FROM questions q
 INNER JOIN users u ON u.id = q.user_id
 INNER JOIN rooms r ON r.id = q.room_id
 WHERE q.id = ?1";

pub async fn create_question(
    pool: &DbPool,
    id: i64,
    content: &str,
    room_id: i64,
    user_id: i64,
) -> Result<QuestionRow, DbError> {
    let row = sqlx::query_as::<_, QuestionRow>(&format!(
        "INSERT INTO questions (id, content, room_id, user_id)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(id)
    .bind(content)
    .bind(room_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_question(pool: &DbPool, id: i64) -> Result<Option<QuestionRow>, DbError> {
    let row = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_question_detail(pool: &DbPool, id: i64) -> Result<Option<QuestionDetailRow>, DbError> {
    let row = sqlx::query_as::<_, QuestionDetailRow>(DETAIL_QUERY)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn mark_answered(pool: &DbPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE questions SET is_answered = TRUE, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Store the recomputed denormalized vote count. The vote set stays the
/// source of truth; this is a read-path cache.
pub async fn set_vote_count(pool: &DbPool, id: i64, vote_count: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE questions SET vote_count = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1")
        .bind(id)
        .bind(vote_count)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, rooms, run_migrations, users};

    async fn seeded_pool() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        users::create_user(&pool, 1, "Rosa", "Diaz", "rosa@example.com", None)
            .await
            .expect("admin");
        users::create_user(&pool, 2, "Sam", "Chen", "sam@example.com", Some("https://a/s.png"))
            .await
            .expect("user");
        rooms::create_room(&pool, 10, "ABC123", "All hands", None, 1)
            .await
            .expect("room");
        pool
    }

    #[tokio::test]
    async fn question_detail_hydrates_author_and_room() {
        let pool = seeded_pool().await;
        create_question(&pool, 100, "Hello?", 10, 2)
            .await
            .expect("question");

        let detail = get_question_detail(&pool, 100)
            .await
            .expect("detail")
            .expect("exists");
        let model = detail.into_model();
        assert_eq!(model.content, "Hello?");
        assert_eq!(model.vote_count, 0);
        assert_eq!(model.user.first_name, "Sam");
        assert_eq!(model.user.avatar_url.as_deref(), Some("https://a/s.png"));
        assert_eq!(model.room.code, "ABC123");
    }

    #[tokio::test]
    async fn mark_answered_flips_the_flag_once() {
        let pool = seeded_pool().await;
        create_question(&pool, 100, "Hello?", 10, 2)
            .await
            .expect("question");

        mark_answered(&pool, 100).await.expect("mark");
        let row = get_question(&pool, 100)
            .await
            .expect("get")
            .expect("exists");
        assert!(row.is_answered);

        let err = mark_answered(&pool, 999).await.expect_err("missing id");
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn vote_count_cache_is_writable() {
        let pool = seeded_pool().await;
        create_question(&pool, 100, "Hello?", 10, 2)
            .await
            .expect("question");
        set_vote_count(&pool, 100, 3).await.expect("set");
        let row = get_question(&pool, 100)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(row.vote_count, 3);
    }
}
