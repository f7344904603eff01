//! Persistent Store: the data model for a download registry and its
//! crash-safe, total-replace serialization to a single descriptor file.

pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use config::{Config, MAX_CONCURRENT_DOWNLOADS, NUM_CHUNKS};
pub use error::StoreError;
pub use model::{Chunk, ChunkStatus, DownloadEntry, DownloadStatus};
pub use store::{part_file_name, Store};
