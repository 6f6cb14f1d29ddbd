// planner/src/error.rs

use std::io;
use thiserror::Error;

/// Failures the store does not absorb. Everything else (bad input, unknown
/// ids, malformed persisted data) is repaired or ignored silently.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage key {key:?}: {source}")]
    Storage { key: String, #[source] source: io::Error },
    #[error("serialize {key:?}: {source}")]
    Serialize { key: String, #[source] source: serde_json::Error },
    #[error("config: {0}")]
    Config(String),
}

impl StoreError {
    pub fn storage(key: impl Into<String>, source: io::Error) -> Self {
        Self::Storage { key: key.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
