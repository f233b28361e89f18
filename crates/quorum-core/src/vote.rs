use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use quorum_db::{questions, votes, DbError, DbPool};
use quorum_models::gateway::{VoteAction, VoteUpdate};
use quorum_util::snowflake;

use crate::error::CoreError;

/// Serializes vote toggles per question.
///
/// The denormalized `vote_count` on the question row is recomputed from the
/// vote set and stored on every toggle; two concurrent toggles for the same
/// question could otherwise interleave recompute and store and lose an
/// update. Toggles for different questions proceed concurrently.
#[derive(Default)]
pub struct VoteToggler {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl VoteToggler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip `user_id`'s vote on a question: delete the vote if it exists,
    /// create it otherwise, then recompute and store the question's vote
    /// count. The (user, question) uniqueness is enforced by the schema; a
    /// race that slips past the existence check surfaces as a conflict
    /// rather than a double count.
    pub async fn toggle(
        &self,
        db: &DbPool,
        worker_id: u16,
        question_id: i64,
        user_id: i64,
    ) -> Result<VoteUpdate, CoreError> {
        let lock = self
            .locks
            .entry(question_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        questions::get_question(db, question_id)
            .await?
            .ok_or(CoreError::QuestionNotFound)?;

        let action = match votes::find_vote(db, question_id, user_id).await? {
            Some(existing) => {
                votes::delete_vote(db, existing.id).await?;
                VoteAction::Removed
            }
            None => {
                match votes::create_vote(db, snowflake::generate(worker_id), question_id, user_id)
                    .await
                {
                    Ok(_) => VoteAction::Added,
                    Err(DbError::Conflict) => {
                        return Err(CoreError::Conflict(format!(
                            "vote already exists for question {question_id}"
                        )))
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let vote_count = votes::count_for_question(db, question_id).await?;
        questions::set_vote_count(db, question_id, vote_count).await?;
        let has_voted = votes::has_user_voted(db, question_id, user_id).await?;

        drop(_guard);
        // Drop the lock entry once nobody else is queued on it.
        self.locks
            .remove_if(&question_id, |_, lock| Arc::strong_count(lock) == 2);

        Ok(VoteUpdate {
            question_id,
            user_id,
            vote_count,
            has_voted,
            action,
        })
    }
}
