//! Durable snapshot of the download registry: a single JSON descriptor file,
//! replaced atomically on every save.

use crate::error::StoreError;
use crate::model::{ChunkStatus, DownloadEntry, DownloadStatus};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name a chunk's part file receives under an entry's `temp_dir`.
pub fn part_file_name(chunk_id: u8) -> String {
    format!("part_{chunk_id}")
}

/// Reads and writes the persistent store file.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the store, applying recovery normalization to every entry.
    ///
    /// Returns an empty registry (rather than erroring) when the file is
    /// missing, which is the expected state on first run.
    pub async fn load(&self) -> Result<Vec<(String, DownloadEntry)>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut entries: Vec<(String, DownloadEntry)> = serde_json::from_slice(&bytes)?;

        for (_, entry) in entries.iter_mut() {
            normalize_on_load(entry).await;
        }

        info!(count = entries.len(), "loaded download registry");
        Ok(entries)
    }

    /// Serializes `entries` and replaces the store file atomically: write to a
    /// sibling temp path, then rename onto the real path. A crash mid-write
    /// leaves the original file untouched.
    pub async fn save(&self, entries: &[(String, DownloadEntry)]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(StoreError::Persist)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(StoreError::Persist)?;

        Ok(())
    }
}

/// Applies the §4.1 recovery rules to one entry loaded from disk.
async fn normalize_on_load(entry: &mut DownloadEntry) {
    if matches!(entry.status, DownloadStatus::Downloading | DownloadStatus::Queued) {
        entry.status = DownloadStatus::Queued;
    }

    let temp_dir_exists = match &entry.temp_dir {
        Some(dir) => tokio::fs::metadata(dir).await.is_ok(),
        None => false,
    };

    if temp_dir_exists {
        let dir = entry.temp_dir.clone().unwrap();
        for chunk in entry.chunks.iter_mut() {
            chunk.downloaded = size_on_disk(&dir, chunk.id).await;
            if chunk.status == ChunkStatus::Downloading {
                chunk.status = ChunkStatus::Pending;
            }
        }
    } else {
        warn!(id = %entry.id, "temp dir missing on load, restarting download from zero");
        for chunk in entry.chunks.iter_mut() {
            chunk.downloaded = 0;
        }
    }

    entry.recompute_aggregate();
}

async fn size_on_disk(temp_dir: &Path, chunk_id: u8) -> u64 {
    let part_path = temp_dir.join(part_file_name(chunk_id));
    tokio::fs::metadata(&part_path).await.map(|m| m.len()).unwrap_or(0)
}
