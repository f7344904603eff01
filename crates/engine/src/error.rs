//! Errors raised by the Download Engine (§7 of the specification).

use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// HEAD response lacks `Accept-Ranges: bytes`. No entry is persisted.
    #[error("{url} does not support ranged fetch")]
    UnsupportedRangedFetch { url: String },

    /// `Content-Length` absent or unparsable. No entry is persisted.
    #[error("{url} did not report a usable Content-Length")]
    MetadataMissing { url: String },

    /// HTTP-level failure obtaining a chunk body (pre-body). Not retried.
    #[error("Chunk {chunk_id} failed: {message}")]
    ChunkNetworkError { chunk_id: u8, message: String },

    /// Mid-body failure while streaming a chunk. Not retried.
    #[error("Chunk {chunk_id} failed: {message}")]
    ChunkStreamError { chunk_id: u8, message: String },

    /// Any I/O failure during assembly. `temp_dir` is preserved.
    #[error("Failed to assemble file.")]
    AssemblyFailed,

    /// The underlying network request itself failed (DNS, TLS, connect, ...).
    #[error("network error: {0}")]
    NetworkError(String),

    /// Malformed persistent store; the engine logs and proceeds with an empty registry.
    #[error(transparent)]
    LoadError(#[from] StoreError),

    /// Failure writing the persistent store; the engine logs and proceeds in memory.
    #[error("failed to persist registry: {0}")]
    PersistError(String),

    /// No entry exists for the given id.
    #[error("no download with id {0}")]
    NotFound(String),
}
