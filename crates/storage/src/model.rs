//! The persisted data model: download entries and their chunks.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// Lifecycle state of a [`DownloadEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Paused,
    Assembling,
    Complete,
    Error,
}

/// Lifecycle state of a single [`Chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Downloading,
    Paused,
    Complete,
    Error,
}

/// A contiguous byte range of the source assigned to one parallel fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u8,
    pub start: u64,
    pub end: u64,
    pub status: ChunkStatus,
    pub downloaded: u64,

    /// Transient speed-window state. Never persisted; reset to defaults on load.
    #[serde(skip)]
    pub current_speed: u64,
    #[serde(skip)]
    pub last_timestamp: Option<Instant>,
    #[serde(skip)]
    pub last_downloaded_size: u64,
}

impl Chunk {
    pub fn new(id: u8, start: u64, end: u64) -> Self {
        Self {
            id,
            start,
            end,
            status: ChunkStatus::Pending,
            downloaded: 0,
            current_speed: 0,
            last_timestamp: None,
            last_downloaded_size: 0,
        }
    }

    /// Size of the chunk's assigned range, in bytes.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `true` once every byte in the chunk's range has been written.
    pub fn is_complete(&self) -> bool {
        self.downloaded >= self.size()
    }

    /// Absolute byte offset in the source to resume this chunk from.
    pub fn resume_position(&self) -> u64 {
        self.start + self.downloaded
    }
}

/// One download the user submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub final_path: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub total_size: u64,
    pub downloaded_size: u64,
    pub status: DownloadStatus,
    pub current_speed: u64,
    pub error: Option<String>,
    pub chunks: Vec<Chunk>,
}

impl DownloadEntry {
    /// `(total_size - downloaded_size) / current_speed`, or `None` while stalled.
    pub fn eta(&self) -> Option<u64> {
        if self.current_speed == 0 {
            return None;
        }
        Some((self.total_size - self.downloaded_size) / self.current_speed)
    }

    /// Recomputes `downloaded_size` and `current_speed` from the chunks.
    /// Called at the end of every aggregation tick to uphold the
    /// `sum(chunks[i].downloaded) == downloaded_size` invariant.
    pub fn recompute_aggregate(&mut self) {
        self.downloaded_size = self.chunks.iter().map(|c| c.downloaded).sum();
        self.current_speed = self
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Downloading)
            .map(|c| c.current_speed)
            .sum();
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        (self.downloaded_size as f64 / self.total_size as f64) * 100.0
    }
}
