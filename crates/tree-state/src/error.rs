use thiserror::Error;
use tree_state_path::PathError;

/// Failures surfaced to the caller of a store operation.
///
/// All of these indicate a caller or schema bug; none is retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("subscription to `{path}` was already unsubscribed")]
    DoubleUnsubscribe { path: String },
    #[error("malformed array operation: {0}")]
    MalformedArrayOperation(String),
    #[error("array index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("invalid change: {0}")]
    InvalidChange(String),
}

/// Failures inside a cache handler. Logged by the store, never propagated.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cannot persist change: {0}")]
    Unpersistable(String),
}
