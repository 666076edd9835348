//! Error types for the state store.

use thiserror::Error;

/// Errors that can occur when talking to the shared state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be decoded.
    #[error("corrupt store value at key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
