//! Cache storage for per-level question lists.
//!
//! [`LevelStore`] is the capability the engine and the sweeper share: atomic
//! single-key primitives plus lifetime inspection. Sequences built from these
//! primitives are not atomic.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use super::error::CacheError;
use super::lock::{rw_read, rw_write};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("lifetime of {ttl_secs}s is out of range")]
    TtlOutOfRange { ttl_secs: u64 },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[async_trait]
pub trait LevelStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` and arm a fresh lifetime of `ttl`.
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration)
    -> Result<(), StoreError>;

    /// Overwrite the value of a live key without touching its deadline.
    ///
    /// Returns false, writing nothing, when the key is absent or already expired.
    async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remaining lifetime of a live key, `None` if it does not exist.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

/// A shared [`LevelStore`] whose every call is bounded by a timeout.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn LevelStore>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn LevelStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout {
                op,
                timeout_ms: self.timeout.as_millis(),
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.bounded("get", self.inner.get(key)).await
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.bounded("set_with_ttl", self.inner.set_with_ttl(key, value, ttl))
            .await
    }

    pub async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> Result<bool, CacheError> {
        self.bounded("replace_keep_ttl", self.inner.replace_keep_ttl(key, value))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.bounded("keys", self.inner.keys()).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.bounded("ttl", self.inner.ttl(key)).await
    }
}

struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process [`LevelStore`] with passive expiry.
///
/// Expired keys disappear on the next access, just like an external store
/// would drop them; nothing is flushed on that path.
#[derive(Default)]
pub struct MemoryLevelStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryLevelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.slots, "memory_store.len")
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, now: Instant) {
        rw_write(&self.slots, "memory_store.purge").retain(|_, slot| slot.is_live(now));
    }
}

#[async_trait]
impl LevelStore for MemoryLevelStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let expired = {
            let slots = rw_read(&self.slots, "memory_store.get");
            match slots.get(key) {
                Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.purge_expired(now);
        }
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(StoreError::TtlOutOfRange {
                ttl_secs: ttl.as_secs(),
            })?;
        rw_write(&self.slots, "memory_store.set_with_ttl")
            .insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut slots = rw_write(&self.slots, "memory_store.replace_keep_ttl");
        match slots.get_mut(key) {
            Some(slot) if slot.is_live(now) => {
                slot.value = value;
                Ok(true)
            }
            Some(_) => {
                slots.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = rw_write(&self.slots, "memory_store.delete").remove(key);
        Ok(removed.is_some_and(|slot| slot.is_live(now)))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        self.purge_expired(now);
        let mut keys: Vec<String> = rw_read(&self.slots, "memory_store.keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let slots = rw_read(&self.slots, "memory_store.ttl");
        Ok(slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.expires_at.saturating_duration_since(now)))
    }
}
