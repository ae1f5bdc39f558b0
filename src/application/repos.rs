//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::StoredQuestion;
use crate::domain::types::Level;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result of writing a question's last-shown timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShownUpdate {
    Applied,
    /// The question no longer exists; not an error.
    NotFound,
}

/// The durable catalog of questions.
#[async_trait]
pub trait QuestionsRepo: Send + Sync {
    /// The `limit` questions of `level` shown least recently, never-shown first,
    /// each with its full option set.
    async fn fetch_batch(&self, level: Level, limit: u32)
    -> Result<Vec<StoredQuestion>, RepoError>;

    async fn apply_shown_update(
        &self,
        id: i64,
        shown_at: OffsetDateTime,
    ) -> Result<ShownUpdate, RepoError>;
}
