//! Storage representation of a level's cached list.
//!
//! A list is stored as a JSON array in stored order. `shown_at` is written as
//! an RFC 3339 string with full sub-second precision, or `null` when absent.

use thiserror::Error;

use crate::domain::entities::CachedTest;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode cached list: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode cached list: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn encode(records: &[CachedTest]) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(records).map_err(CodecError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Vec<CachedTest>, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}
