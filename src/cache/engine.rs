//! Level cache engine.
//!
//! One entry per level: the whole ordered list of cached questions. Seeding
//! arms the entry's lifetime; marking a question shown rewrites the list but
//! leaves the deadline untouched, so an entry in active use still expires and
//! gets flushed on schedule.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument};

use crate::domain::entities::{CachedTest, dedup_by_id};
use crate::domain::types::Level;

use super::codec;
use super::error::CacheError;
use super::flush::Flusher;
use super::store::TimedStore;

const METRIC_CACHE_HIT_TOTAL: &str = "quizcache_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "quizcache_cache_miss_total";

pub struct LevelCache {
    store: TimedStore,
    flusher: Arc<Flusher>,
}

impl LevelCache {
    pub fn new(store: TimedStore, flusher: Arc<Flusher>) -> Self {
        Self { store, flusher }
    }

    /// Replace the level's list and arm a fresh lifetime.
    ///
    /// Duplicate ids keep their first occurrence.
    #[instrument(skip_all, fields(level = %level, count = records.len()))]
    pub async fn seed(
        &self,
        level: Level,
        records: Vec<CachedTest>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let records = dedup_by_id(records);
        let bytes = codec::encode(&records)?;
        self.store.set_with_ttl(level.as_str(), bytes, ttl).await
    }

    /// First unshown question of the level, in stored order.
    ///
    /// `None` is a miss. When the list exists but is fully shown, it is flushed
    /// to the question store and deleted before the miss is reported.
    #[instrument(skip_all, fields(level = %level))]
    pub async fn next_unshown(&self, level: Level) -> Result<Option<CachedTest>, CacheError> {
        let key = level.as_str();
        let Some(records) = self.load(key).await? else {
            counter!(METRIC_CACHE_MISS_TOTAL, "reason" => "absent").increment(1);
            return Ok(None);
        };

        if let Some(record) = records.iter().find(|record| !record.shown) {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            return Ok(Some(record.clone()));
        }

        counter!(METRIC_CACHE_MISS_TOTAL, "reason" => "exhausted").increment(1);
        info!(
            level = key,
            count = records.len(),
            "Level list exhausted; flushing before eviction"
        );
        self.flusher.flush_list(key, &records).await;
        self.store.delete(key).await?;
        Ok(None)
    }

    /// Mark question `id` of the level as shown at `shown_at`.
    ///
    /// Returns false when the level has no entry, the id is not in it, or the
    /// entry vanished before the rewrite landed. None of these are errors.
    #[instrument(skip_all, fields(level = %level, question_id = id))]
    pub async fn mark_shown(
        &self,
        level: Level,
        id: i64,
        shown_at: OffsetDateTime,
    ) -> Result<bool, CacheError> {
        let key = level.as_str();
        let Some(mut records) = self.load(key).await? else {
            return Ok(false);
        };

        let Some(record) = records.iter_mut().find(|record| record.id == id) else {
            return Ok(false);
        };
        record.mark_shown(shown_at);

        let bytes = codec::encode(&records)?;
        let written = self.store.replace_keep_ttl(key, bytes).await?;
        if !written {
            // Evicted between read and write; the flush that evicted it already ran.
            debug!(level = key, question_id = id, "Shown update lost to concurrent eviction");
        }
        Ok(written)
    }

    /// Read and decode a level's list.
    ///
    /// An undecodable entry carries no recoverable state; it is dropped and
    /// treated as absent so the level can be refilled.
    async fn load(&self, key: &str) -> Result<Option<Vec<CachedTest>>, CacheError> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };

        match codec::decode(&bytes) {
            Ok(records) => Ok(Some(records)),
            Err(err) => {
                error!(level = key, error = %err, "Discarding undecodable cache entry");
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;
    use crate::application::repos::{QuestionsRepo, RepoError, ShownUpdate};
    use crate::cache::store::{LevelStore, MemoryLevelStore, StoreError};
    use crate::domain::entities::{QuestionOption, StoredQuestion};

    #[derive(Default)]
    struct RecordingRepo {
        writes: Mutex<Vec<(i64, OffsetDateTime)>>,
    }

    #[async_trait]
    impl QuestionsRepo for RecordingRepo {
        async fn fetch_batch(
            &self,
            _level: Level,
            _limit: u32,
        ) -> Result<Vec<StoredQuestion>, RepoError> {
            Ok(Vec::new())
        }

        async fn apply_shown_update(
            &self,
            id: i64,
            shown_at: OffsetDateTime,
        ) -> Result<ShownUpdate, RepoError> {
            self.writes.lock().unwrap().push((id, shown_at));
            Ok(ShownUpdate::Applied)
        }
    }

    struct Fixture {
        store: Arc<MemoryLevelStore>,
        repo: Arc<RecordingRepo>,
        cache: LevelCache,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLevelStore::new());
        let repo = Arc::new(RecordingRepo::default());
        let timeout = Duration::from_secs(1);
        let flusher = Arc::new(Flusher::new(repo.clone(), timeout));
        let cache = LevelCache::new(TimedStore::new(store.clone(), timeout), flusher);
        Fixture { store, repo, cache }
    }

    fn record(id: i64) -> CachedTest {
        CachedTest {
            id,
            question_text: format!("Question {id}"),
            options: vec![
                QuestionOption {
                    option_id: 0,
                    option_text: "first".into(),
                },
                QuestionOption {
                    option_id: 1,
                    option_text: "second".into(),
                },
            ],
            correct_option_id: 0,
            explanation: "Explanation".into(),
            shown_at: None,
            shown: false,
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn absent_level_is_a_plain_miss() {
        let fx = fixture();

        assert_eq!(fx.cache.next_unshown(Level::A1).await.expect("lookup"), None);
        assert!(fx.repo.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn serves_first_unshown_in_stored_order() {
        let fx = fixture();
        fx.cache
            .seed(Level::B1, vec![record(10), record(11), record(12)], TTL)
            .await
            .expect("seed");

        let first = fx.cache.next_unshown(Level::B1).await.expect("lookup");
        assert_eq!(first.map(|r| r.id), Some(10));

        let t1 = datetime!(2024-04-01 09:00 UTC);
        assert!(fx.cache.mark_shown(Level::B1, 10, t1).await.expect("mark"));

        let next = fx.cache.next_unshown(Level::B1).await.expect("lookup");
        assert_eq!(next.map(|r| r.id), Some(11));
    }

    #[tokio::test]
    async fn exhausted_list_is_flushed_then_deleted() {
        let fx = fixture();
        fx.cache
            .seed(Level::B1, vec![record(10), record(11), record(12)], TTL)
            .await
            .expect("seed");

        let stamps = [
            (10, datetime!(2024-04-01 09:00 UTC)),
            (11, datetime!(2024-04-01 09:01 UTC)),
            (12, datetime!(2024-04-01 09:02 UTC)),
        ];
        for (id, at) in stamps {
            assert!(fx.cache.mark_shown(Level::B1, id, at).await.expect("mark"));
        }

        assert_eq!(fx.cache.next_unshown(Level::B1).await.expect("lookup"), None);
        assert_eq!(fx.repo.writes.lock().unwrap().as_slice(), &stamps);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_and_list_is_intact() {
        let fx = fixture();
        fx.cache
            .seed(Level::A2, vec![record(1), record(2)], TTL)
            .await
            .expect("seed");

        let updated = fx
            .cache
            .mark_shown(Level::A2, 99, datetime!(2024-01-01 00:00 UTC))
            .await
            .expect("mark");

        assert!(!updated);
        let stored = fx.store.get("A2").await.expect("get").expect("entry");
        let records = codec::decode(&stored).expect("decode");
        assert_eq!(records, vec![record(1), record(2)]);
    }

    #[tokio::test]
    async fn mark_on_missing_level_is_not_found() {
        let fx = fixture();
        let updated = fx
            .cache
            .mark_shown(Level::C1, 1, datetime!(2024-01-01 00:00 UTC))
            .await
            .expect("mark");
        assert!(!updated);
        assert!(fx.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mark_shown_does_not_rearm_lifetime() {
        let fx = fixture();
        fx.cache
            .seed(Level::B2, vec![record(1), record(2)], Duration::from_secs(10))
            .await
            .expect("seed");

        tokio::time::advance(Duration::from_secs(7)).await;
        fx.cache
            .mark_shown(Level::B2, 1, datetime!(2024-01-01 00:00 UTC))
            .await
            .expect("mark");

        assert_eq!(
            fx.store.ttl("B2").await.expect("ttl"),
            Some(Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn seed_overwrites_and_drops_duplicate_ids() {
        let fx = fixture();
        fx.cache
            .seed(Level::A1, vec![record(1)], TTL)
            .await
            .expect("seed");
        fx.cache
            .seed(Level::A1, vec![record(5), record(6), record(5)], TTL)
            .await
            .expect("reseed");

        let stored = fx.store.get("A1").await.expect("get").expect("entry");
        let ids: Vec<i64> = codec::decode(&stored)
            .expect("decode")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[tokio::test]
    async fn seed_with_unrepresentable_lifetime_fails_cleanly() {
        let fx = fixture();

        let err = fx
            .cache
            .seed(Level::A1, vec![record(1)], Duration::from_secs(u64::MAX))
            .await
            .expect_err("lifetime out of range");

        assert!(matches!(
            err,
            CacheError::Store(StoreError::TtlOutOfRange { .. })
        ));
        assert!(fx.store.is_empty());
    }

    /// Deletes the key right before every keep-ttl rewrite, as a sweep
    /// landing between a read and its write would.
    struct EvictingStore {
        inner: Arc<MemoryLevelStore>,
    }

    #[async_trait]
    impl LevelStore for EvictingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key).await
        }

        async fn set_with_ttl(
            &self,
            key: &str,
            value: Vec<u8>,
            ttl: Duration,
        ) -> Result<(), StoreError> {
            self.inner.set_with_ttl(key, value, ttl).await
        }

        async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
            self.inner.delete(key).await?;
            self.inner.replace_keep_ttl(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.delete(key).await
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.keys().await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
            self.inner.ttl(key).await
        }
    }

    #[tokio::test]
    async fn mark_lost_to_eviction_reports_not_found_without_recreating() {
        let memory = Arc::new(MemoryLevelStore::new());
        let repo = Arc::new(RecordingRepo::default());
        let timeout = Duration::from_secs(1);
        let store = TimedStore::new(
            Arc::new(EvictingStore {
                inner: memory.clone(),
            }),
            timeout,
        );
        let cache = LevelCache::new(store, Arc::new(Flusher::new(repo.clone(), timeout)));
        cache
            .seed(Level::B1, vec![record(1), record(2)], TTL)
            .await
            .expect("seed");

        let updated = cache
            .mark_shown(Level::B1, 1, datetime!(2024-01-01 00:00 UTC))
            .await
            .expect("mark");

        assert!(!updated);
        assert!(memory.is_empty());
        assert!(repo.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_is_discarded_as_a_miss() {
        let fx = fixture();
        fx.store
            .set_with_ttl("C1", b"{broken".to_vec(), TTL)
            .await
            .expect("set");

        assert_eq!(fx.cache.next_unshown(Level::C1).await.expect("lookup"), None);
        assert!(fx.store.is_empty());
    }
}
