//! Write-back of consumption state from the cache to the question store.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error};

use crate::application::repos::{QuestionsRepo, ShownUpdate};
use crate::domain::entities::CachedTest;

use super::codec;
use super::error::CacheError;
use super::store::TimedStore;

const METRIC_FLUSH_WRITE_TOTAL: &str = "quizcache_flush_write_total";
const METRIC_FLUSH_FAILURE_TOTAL: &str = "quizcache_flush_failure_total";

/// A single record whose write failed during a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    pub id: i64,
    pub reason: String,
}

/// Outcome of flushing one level's list.
///
/// A non-empty `failed` list is a partial flush failure. It is logged by the
/// flusher and never returned as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub key: String,
    pub applied: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub failed: Vec<FailedWrite>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<i64> {
        self.failed.iter().map(|failure| failure.id).collect()
    }
}

pub struct Flusher {
    repo: Arc<dyn QuestionsRepo>,
    timeout: Duration,
}

impl Flusher {
    pub fn new(repo: Arc<dyn QuestionsRepo>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Persist the last-shown timestamp of every record that carries one.
    ///
    /// Every record is attempted even when earlier writes fail. Re-flushing the
    /// same timestamp is harmless.
    pub async fn flush_list(&self, key: &str, records: &[CachedTest]) -> FlushReport {
        let mut report = FlushReport {
            key: key.to_string(),
            ..Default::default()
        };

        for record in records {
            let Some(shown_at) = record.shown_at else {
                report.skipped += 1;
                continue;
            };

            let outcome = tokio::time::timeout(
                self.timeout,
                self.repo.apply_shown_update(record.id, shown_at),
            )
            .await;

            match outcome {
                Ok(Ok(ShownUpdate::Applied)) => report.applied += 1,
                Ok(Ok(ShownUpdate::NotFound)) => {
                    debug!(key, question_id = record.id, "Flushed question no longer exists");
                    report.not_found += 1;
                }
                Ok(Err(err)) => report.failed.push(FailedWrite {
                    id: record.id,
                    reason: err.to_string(),
                }),
                Err(_) => report.failed.push(FailedWrite {
                    id: record.id,
                    reason: format!("timed out after {}ms", self.timeout.as_millis()),
                }),
            }
        }

        counter!(METRIC_FLUSH_WRITE_TOTAL).increment((report.applied + report.not_found) as u64);

        if !report.is_complete() {
            counter!(METRIC_FLUSH_FAILURE_TOTAL).increment(report.failed.len() as u64);
            let reasons: Vec<&str> = report.failed.iter().map(|f| f.reason.as_str()).collect();
            error!(
                key,
                failed_ids = ?report.failed_ids(),
                reasons = ?reasons,
                applied = report.applied,
                "Partial flush failure; cache entry is dropped regardless"
            );
        }

        report
    }

    /// Read and decode a key's list without touching it.
    ///
    /// An undecodable entry yields an empty list so it is still evicted.
    pub async fn capture(
        &self,
        store: &TimedStore,
        key: &str,
    ) -> Result<Option<Vec<CachedTest>>, CacheError> {
        let Some(bytes) = store.get(key).await? else {
            return Ok(None);
        };

        Ok(Some(codec::decode(&bytes).unwrap_or_else(|err| {
            error!(key, error = %err, "Discarding undecodable cache entry");
            Vec::new()
        })))
    }

    /// Flush a previously captured list, then delete the key.
    ///
    /// The key is deleted even when some writes failed: the flush was attempted.
    pub async fn write_back_and_evict(
        &self,
        store: &TimedStore,
        key: &str,
        records: &[CachedTest],
    ) -> Result<FlushReport, CacheError> {
        let report = self.flush_list(key, records).await;
        store.delete(key).await?;
        Ok(report)
    }

    /// Longest [`Self::write_back_and_evict`] can take for `records`: one
    /// bounded write per timestamped record plus the delete.
    pub fn worst_case(&self, records: &[CachedTest]) -> Duration {
        let calls = records.iter().filter(|r| r.shown_at.is_some()).count() + 1;
        self.timeout
            .saturating_mul(u32::try_from(calls).unwrap_or(u32::MAX))
    }
}
