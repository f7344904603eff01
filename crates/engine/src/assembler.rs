//! Assembler: concatenates a download's part files into its final output,
//! sequentially and in chunk-index order (§4.6).

use crate::error::DownloadError;
use storage::{part_file_name, DownloadEntry};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

const COPY_BUFFER_SIZE: usize = 1024 * 1024;

pub struct Assembler;

impl Assembler {
    pub fn new() -> Self {
        Self
    }

    /// Concatenates `entry.temp_dir/part_0 .. part_{N-1}` into
    /// `entry.final_path`. Fails with [`DownloadError::AssemblyFailed`] if
    /// any part file is missing or its size doesn't match its chunk's span;
    /// the caller is responsible for leaving `temp_dir` in place on failure
    /// and removing it on success.
    pub async fn assemble(&self, entry: &DownloadEntry) -> Result<(), DownloadError> {
        let temp_dir = entry.temp_dir.as_ref().ok_or(DownloadError::AssemblyFailed)?;

        for chunk in &entry.chunks {
            let part_path = temp_dir.join(part_file_name(chunk.id));
            let size = tokio::fs::metadata(&part_path).await.map(|m| m.len()).map_err(|e| {
                error!(id = %entry.id, chunk = chunk.id, "part file missing: {e}");
                DownloadError::AssemblyFailed
            })?;
            if size != chunk.size() {
                error!(
                    id = %entry.id,
                    chunk = chunk.id,
                    expected = chunk.size(),
                    actual = size,
                    "part file size mismatch"
                );
                return Err(DownloadError::AssemblyFailed);
            }
        }

        if let Some(parent) = entry.final_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| DownloadError::AssemblyFailed)?;
        }

        let mut output = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&entry.final_path)
            .await
            .map_err(|_| DownloadError::AssemblyFailed)?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        for chunk in &entry.chunks {
            let part_path = temp_dir.join(part_file_name(chunk.id));
            let mut input = File::open(&part_path).await.map_err(|_| DownloadError::AssemblyFailed)?;

            loop {
                let n = input.read(&mut buffer).await.map_err(|_| DownloadError::AssemblyFailed)?;
                if n == 0 {
                    break;
                }
                output.write_all(&buffer[..n]).await.map_err(|_| DownloadError::AssemblyFailed)?;
            }
        }

        output.flush().await.map_err(|_| DownloadError::AssemblyFailed)?;
        info!(id = %entry.id, path = %entry.final_path.display(), "assembly complete");
        Ok(())
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}
