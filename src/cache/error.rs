use thiserror::Error;

use super::codec::CodecError;
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("cache operation `{op}` timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u128 },
}
