//! Expiry sweep scheduler.
//!
//! A single background loop that, every `check_interval`, flushes and evicts
//! each entry that could expire before the next tick reaches it. The shutdown
//! flush runs the same write-back for every entry regardless of lifetime.
//!
//! A sweep reads every entry it will flush before issuing any write. The next
//! tick cannot start until those writes finish, so the look-ahead window is the
//! longer of one interval and the worst-case duration of the writes queued so
//! far. A slow question store therefore widens the window instead of letting
//! entries expire unflushed.
//!
//! Sweep ticks and the shutdown flush are serialized on one async mutex so
//! they never race on the same key.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::entities::CachedTest;

use super::config::CacheConfig;
use super::error::CacheError;
use super::flush::{FlushReport, Flusher};
use super::lock::mutex_lock;
use super::store::TimedStore;

const METRIC_SWEEP_EVICTED_TOTAL: &str = "quizcache_sweep_evicted_total";
const METRIC_SWEEP_MS: &str = "quizcache_sweep_ms";

/// What one sweep (or the shutdown flush) did.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub inspected: usize,
    pub evicted: Vec<FlushReport>,
    pub errors: usize,
}

impl SweepSummary {
    pub fn evicted_keys(&self) -> Vec<&str> {
        self.evicted.iter().map(|report| report.key.as_str()).collect()
    }
}

struct SweepHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ExpirySweeper {
    store: TimedStore,
    flusher: Arc<Flusher>,
    check_interval: Duration,
    gate: tokio::sync::Mutex<()>,
    handle: Mutex<Option<SweepHandle>>,
}

impl ExpirySweeper {
    pub fn new(store: TimedStore, flusher: Arc<Flusher>, config: &CacheConfig) -> Self {
        Self {
            store,
            flusher,
            check_interval: config.check_interval,
            gate: tokio::sync::Mutex::new(()),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the periodic loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut handle = mutex_lock(&self.handle, "sweeper.start");
        if handle.is_some() {
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let sweeper = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // Skip the first immediate tick
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        if let Err(err) = sweeper.sweep_once().await {
                            warn!(error = %err, "Expiry sweep aborted; retrying next tick");
                        }
                    }
                }
            }
            debug!("Expiry sweep loop stopped");
        });

        info!(
            check_interval_ms = self.check_interval.as_millis() as u64,
            "Expiry sweep loop started"
        );
        *handle = Some(SweepHandle { stop, task });
        true
    }

    /// Stop the loop and wait for an in-flight tick to finish.
    pub async fn stop(&self) {
        let handle = mutex_lock(&self.handle, "sweeper.stop").take();
        let Some(SweepHandle { stop, task }) = handle else {
            return;
        };
        let _ = stop.send(true);
        if let Err(err) = task.await {
            warn!(error = %err, "Expiry sweep task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        mutex_lock(&self.handle, "sweeper.is_running").is_some()
    }

    /// One sweep tick: flush and evict every entry that could expire before
    /// the next tick.
    pub async fn sweep_once(&self) -> Result<SweepSummary, CacheError> {
        let _gate = self.gate.lock().await;
        let started_at = Instant::now();
        let mut summary = SweepSummary::default();

        let mut live = Vec::new();
        for key in self.store.keys().await? {
            summary.inspected += 1;
            match self.store.ttl(&key).await {
                Ok(Some(remaining)) => live.push((Instant::now() + remaining, key)),
                Ok(None) => {}
                Err(err) => {
                    warn!(key, error = %err, "Could not read remaining lifetime");
                    summary.errors += 1;
                }
            }
        }
        live.sort();

        let mut captured = Vec::new();
        let mut backlog = Duration::ZERO;
        for (expires_at, key) in live {
            let horizon = Instant::now() + self.check_interval.max(backlog);
            if expires_at > horizon {
                break;
            }
            debug!(
                key,
                remaining_ms = expires_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                backlog_ms = backlog.as_millis() as u64,
                "Entry may expire before the next tick; flushing"
            );
            if let Some(records) = self.capture(&key, &mut summary).await {
                backlog = backlog.saturating_add(self.flusher.worst_case(&records));
                captured.push((key, records));
            }
        }
        self.write_back(captured, &mut summary).await;

        counter!(METRIC_SWEEP_EVICTED_TOTAL).increment(summary.evicted.len() as u64);
        histogram!(METRIC_SWEEP_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        if !summary.evicted.is_empty() {
            info!(evicted = ?summary.evicted_keys(), "Expiry sweep flushed entries");
        }
        Ok(summary)
    }

    /// Flush and evict every entry regardless of remaining lifetime.
    ///
    /// Waits for an in-flight sweep tick first. Call before [`Self::stop`].
    pub async fn shutdown_flush_all(&self) -> Result<SweepSummary, CacheError> {
        let _gate = self.gate.lock().await;
        let mut summary = SweepSummary::default();

        let mut captured = Vec::new();
        for key in self.store.keys().await? {
            summary.inspected += 1;
            if let Some(records) = self.capture(&key, &mut summary).await {
                captured.push((key, records));
            }
        }
        self.write_back(captured, &mut summary).await;

        info!(
            flushed = ?summary.evicted_keys(),
            errors = summary.errors,
            "Shutdown flush complete"
        );
        Ok(summary)
    }

    async fn capture(&self, key: &str, summary: &mut SweepSummary) -> Option<Vec<CachedTest>> {
        match self.flusher.capture(&self.store, key).await {
            Ok(records) => records,
            Err(err) => {
                warn!(key, error = %err, "Could not read cache entry");
                summary.errors += 1;
                None
            }
        }
    }

    async fn write_back(
        &self,
        captured: Vec<(String, Vec<CachedTest>)>,
        summary: &mut SweepSummary,
    ) {
        for (key, records) in captured {
            match self
                .flusher
                .write_back_and_evict(&self.store, &key, &records)
                .await
            {
                Ok(report) => summary.evicted.push(report),
                Err(err) => {
                    warn!(key, error = %err, "Could not evict cache entry");
                    summary.errors += 1;
                }
            }
        }
    }
}
