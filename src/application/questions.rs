//! Question dispensing: the facade the HTTP layer talks to.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::{QuestionsRepo, RepoError};
use crate::cache::{
    CacheConfig, CacheError, ExpirySweeper, Flusher, LevelCache, LevelStore, SweepSummary,
    TimedStore,
};
use crate::domain::entities::CachedTest;
use crate::domain::error::DomainError;
use crate::domain::types::Level;

const METRIC_REFILL_TOTAL: &str = "quizcache_refill_total";

#[derive(Debug, Error)]
pub enum StoreFailure {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("invalid level `{value}`; expected one of {}", Level::accepted())]
    InvalidLevel { value: String },
    #[error("no questions available for level {level}")]
    NoQuestionsAvailable { level: Level },
    #[error("store unavailable")]
    StoreUnavailable(#[source] StoreFailure),
}

impl From<CacheError> for QuizError {
    fn from(err: CacheError) -> Self {
        Self::StoreUnavailable(err.into())
    }
}

impl From<RepoError> for QuizError {
    fn from(err: RepoError) -> Self {
        Self::StoreUnavailable(err.into())
    }
}

/// Result of a shown-state update.
///
/// The update is acknowledged whether or not the question was still cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShownAck {
    pub cached: bool,
}

#[derive(Clone)]
pub struct QuestionService {
    repo: Arc<dyn QuestionsRepo>,
    cache: Arc<LevelCache>,
    sweeper: Arc<ExpirySweeper>,
    config: CacheConfig,
}

impl QuestionService {
    pub fn new(
        repo: Arc<dyn QuestionsRepo>,
        store: Arc<dyn LevelStore>,
        config: CacheConfig,
    ) -> Self {
        let store = TimedStore::new(store, config.operation_timeout);
        let flusher = Arc::new(Flusher::new(repo.clone(), config.operation_timeout));
        let cache = Arc::new(LevelCache::new(store.clone(), flusher.clone()));
        let sweeper = Arc::new(ExpirySweeper::new(store, flusher, &config));
        Self {
            repo,
            cache,
            sweeper,
            config,
        }
    }

    /// Next question of `level` not yet shown from the current cached list.
    ///
    /// On a miss the level is refilled from the question store and looked up
    /// once more.
    pub async fn get_next(&self, level: &str) -> Result<CachedTest, QuizError> {
        let level = parse_level(level)?;

        if let Some(record) = self.cache.next_unshown(level).await? {
            return Ok(record);
        }

        self.refill(level).await?;

        self.cache
            .next_unshown(level)
            .await?
            .ok_or(QuizError::NoQuestionsAvailable { level })
    }

    /// Record that question `id` of `level` was shown, at `shown_at` or now.
    pub async fn mark_shown(
        &self,
        level: &str,
        id: i64,
        shown_at: Option<OffsetDateTime>,
    ) -> Result<ShownAck, QuizError> {
        let level = parse_level(level)?;
        let shown_at = shown_at.unwrap_or_else(OffsetDateTime::now_utc);

        let cached = self.cache.mark_shown(level, id, shown_at).await?;
        if !cached {
            warn!(
                level = %level,
                question_id = id,
                "Shown update matched no cached question; nothing to update"
            );
        }
        Ok(ShownAck { cached })
    }

    pub fn start_sweep(&self) -> bool {
        self.sweeper.start()
    }

    pub async fn stop_sweep(&self) {
        self.sweeper.stop().await;
    }

    pub async fn shutdown_flush_all(&self) -> Result<SweepSummary, QuizError> {
        Ok(self.sweeper.shutdown_flush_all().await?)
    }

    async fn refill(&self, level: Level) -> Result<(), QuizError> {
        let fetched = tokio::time::timeout(
            self.config.operation_timeout,
            self.repo.fetch_batch(level, self.config.batch_size),
        )
        .await
        .map_err(|_| RepoError::Timeout)??;

        let fetched_count = fetched.len();
        let records: Vec<CachedTest> = fetched
            .into_iter()
            .filter_map(|question| {
                let id = question.id;
                CachedTest::try_from(question)
                    .inspect_err(|err| {
                        warn!(
                            level = %level,
                            question_id = id,
                            error = %err,
                            "Skipping invalid stored question"
                        );
                    })
                    .ok()
            })
            .collect();

        if records.is_empty() {
            info!(level = %level, fetched = fetched_count, "Refill found no usable questions");
            return Err(QuizError::NoQuestionsAvailable { level });
        }

        counter!(METRIC_REFILL_TOTAL, "level" => level.as_str()).increment(1);
        info!(level = %level, count = records.len(), "Refilling level cache");
        self.cache
            .seed(level, records, self.config.default_ttl)
            .await?;
        Ok(())
    }
}

fn parse_level(value: &str) -> Result<Level, QuizError> {
    value.parse().map_err(|err: DomainError| match err {
        DomainError::UnknownLevel { value } => QuizError::InvalidLevel { value },
        DomainError::Validation { .. } => QuizError::InvalidLevel {
            value: value.to_string(),
        },
    })
}
