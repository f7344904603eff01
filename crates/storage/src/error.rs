//! Errors raised by the persistent store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read persistent store: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed persistent store: {0}")]
    Load(#[from] serde_json::Error),

    #[error("failed to persist download registry: {0}")]
    Persist(std::io::Error),
}
