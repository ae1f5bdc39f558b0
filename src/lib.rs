//! Quiz question level cache.
//!
//! Serves questions per level from a time-bounded cache, refilling from
//! Postgres on a miss and writing consumption back before entries disappear.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
