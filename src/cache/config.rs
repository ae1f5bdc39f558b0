//! Cache configuration.
//!
//! Controls TTL, sweep cadence, refill batch size and call timeouts via the
//! `[cache]` section of `quizcache.toml`.

use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: u32 = 20;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime armed whenever a level's list is seeded.
    pub default_ttl: Duration,
    /// Sweep tick. Entries whose remaining lifetime is at most this are flushed.
    pub check_interval: Duration,
    /// Number of questions pulled from the store on a refill.
    pub batch_size: u32,
    /// Upper bound for any single cache-store or question-store call.
    pub operation_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            default_ttl: settings.default_ttl,
            check_interval: settings.check_interval,
            batch_size: settings.batch_size.get(),
            operation_timeout: settings.operation_timeout,
        }
    }
}
