use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use quorum_models::RoomParticipant;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// The public shape handed to other room participants.
    pub fn participant(&self) -> RoomParticipant {
        RoomParticipant {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    first_name: &str,
    last_name: &str,
    email: &str,
    avatar_url: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, first_name, last_name, email, avatar_url)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, first_name, last_name, avatar_url, email, created_at, updated_at",
    )
    .bind(id)
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(avatar_url)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, first_name, last_name, avatar_url, email, created_at, updated_at
         FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, first_name, last_name, avatar_url, email, created_at, updated_at
         FROM users WHERE email = ?1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
