//! Quiz level cache
//!
//! Keeps one list of questions per CEFR level in a [`LevelStore`] with a
//! lifetime armed at seed time:
//!
//! - **Engine**: serve the first unshown question, record shown state
//! - **Flusher**: write last-shown timestamps back to the question store
//! - **Sweeper**: flush entries ahead of expiry, and drain everything on shutdown
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `quizcache.toml`:
//!
//! ```toml
//! [cache]
//! default_ttl_seconds = 600
//! check_interval_seconds = 30
//! batch_size = 20
//! operation_timeout_ms = 5000
//! ```

mod codec;
mod config;
mod engine;
mod error;
mod flush;
mod lock;
mod store;
mod sweeper;

pub use codec::{CodecError, decode, encode};
pub use config::CacheConfig;
pub use engine::LevelCache;
pub use error::CacheError;
pub use flush::{FailedWrite, FlushReport, Flusher};
pub use store::{LevelStore, MemoryLevelStore, StoreError, TimedStore};
pub use sweeper::{ExpirySweeper, SweepSummary};
