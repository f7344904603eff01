//! Download Supervisor: owns the lifecycle of one entry at a time — plans
//! it, fans out chunk workers, tears them down on pause, hands a fully
//! downloaded entry to the [`Assembler`] (§4.3).

use crate::assembler::Assembler;
use crate::chunk_worker::{ChunkHandles, ChunkWorker, WorkerOutcome};
use crate::chunked::{calculate_chunks, derive_filename};
use crate::error::DownloadError;
use crate::events::EngineEvent;
use crate::http;
use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use storage::{ChunkStatus, Config, DownloadEntry, DownloadStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Cancel/progress handles for every chunk currently in flight, keyed by
/// `(entry_id, chunk_id)`. Shared between the command loop (pause) and the
/// periodic aggregator (progress reads); workers only ever read/write their
/// own entry.
pub type ActiveStreams = DashMap<(String, u8), ChunkHandles>;

pub struct Supervisor {
    client: Client,
    assembler: Assembler,
    config: Config,
    num_chunks: u8,
}

impl Supervisor {
    pub fn new(client: Client, config: Config, num_chunks: u8) -> Self {
        Self { client, assembler: Assembler::new(), config, num_chunks }
    }

    /// Probes the URL and builds a `Queued` entry. Does not persist or
    /// enqueue — the caller does both under the single-writer rule.
    pub async fn plan(&self, id: String, url: String) -> Result<DownloadEntry, DownloadError> {
        let metadata = http::probe(&self.client, &url).await?;

        if !metadata.supports_ranges {
            return Err(DownloadError::UnsupportedRangedFetch { url });
        }
        let Some(total_size) = metadata.total_size else {
            return Err(DownloadError::MetadataMissing { url });
        };

        let filename = derive_filename(&url, &id);
        let final_path = self.config.download_folder.join(&filename);
        let temp_dir = self.config.temp_dir_for(&id);
        tokio::fs::create_dir_all(&temp_dir).await.map_err(|e| DownloadError::PersistError(e.to_string()))?;

        let chunks = calculate_chunks(total_size, self.num_chunks);

        info!(id = %id, %url, total_size, chunks = chunks.len(), "download planned");

        Ok(DownloadEntry {
            id,
            url,
            filename,
            final_path,
            temp_dir: Some(temp_dir),
            total_size,
            downloaded_size: 0,
            status: DownloadStatus::Queued,
            current_speed: 0,
            error: None,
            chunks,
        })
    }

    /// Spawns one [`ChunkWorker`] per incomplete chunk and transitions the
    /// entry to `Downloading`.
    pub fn start(
        &self,
        entry: &mut DownloadEntry,
        outcome_tx: mpsc::Sender<WorkerOutcome>,
        active: &ActiveStreams,
    ) -> Vec<JoinHandle<()>> {
        let Some(temp_dir) = entry.temp_dir.clone() else {
            warn!(id = %entry.id, "start called on an entry with no temp_dir");
            return Vec::new();
        };

        entry.status = DownloadStatus::Downloading;
        let mut handles = Vec::new();

        for chunk in entry.chunks.iter_mut() {
            if chunk.is_complete() {
                chunk.status = ChunkStatus::Complete;
                continue;
            }
            chunk.status = ChunkStatus::Downloading;

            let chunk_handles = ChunkHandles::new(chunk.downloaded);
            active.insert((entry.id.clone(), chunk.id), chunk_handles.clone());

            let worker = ChunkWorker {
                entry_id: entry.id.clone(),
                chunk_id: chunk.id,
                start: chunk.start,
                end: chunk.end,
                url: entry.url.clone(),
                part_path: temp_dir.join(storage::part_file_name(chunk.id)),
                client: self.client.clone(),
                handles: chunk_handles,
                outcome_tx: outcome_tx.clone(),
            };

            handles.push(tokio::spawn(worker.run()));
        }

        handles
    }

    /// Flips every registered cancel flag for the entry and marks its
    /// in-flight chunks `Paused`. Does not wait for the spawned tasks to
    /// observe the flag — they exit at their next I/O yield point.
    pub fn pause(&self, entry: &mut DownloadEntry, active: &ActiveStreams) {
        entry.status = DownloadStatus::Paused;
        for chunk in entry.chunks.iter_mut() {
            if let Some((_, handles)) = active.remove(&(entry.id.clone(), chunk.id)) {
                handles.cancel.store(true, std::sync::atomic::Ordering::Release);
            }
            if chunk.status == ChunkStatus::Downloading {
                chunk.status = ChunkStatus::Paused;
                chunk.current_speed = 0;
            }
        }
        entry.current_speed = 0;
        info!(id = %entry.id, "download paused");
    }

    /// If every chunk is complete, assembles the final file and transitions
    /// the entry to `Complete` or `Error`, returning the terminal event to
    /// broadcast. Returns `None` while chunks are still in flight.
    pub async fn check_if_complete(&self, entry: &mut DownloadEntry) -> Option<EngineEvent> {
        if !entry.chunks.iter().all(|c| c.is_complete()) {
            return None;
        }

        entry.status = DownloadStatus::Assembling;
        match self.assembler.assemble(entry).await {
            Ok(()) => {
                if let Some(temp_dir) = entry.temp_dir.take() {
                    if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
                        warn!(id = %entry.id, "failed to remove temp dir: {e}");
                    }
                }
                entry.status = DownloadStatus::Complete;
                entry.current_speed = 0;
                entry.downloaded_size = entry.total_size;
                info!(id = %entry.id, path = %entry.final_path.display(), "download complete");
                Some(EngineEvent::DownloadComplete {
                    id: entry.id.clone(),
                    file_path: entry.final_path.display().to_string(),
                })
            }
            Err(e) => {
                error!(id = %entry.id, "assembly failed: {e}");
                entry.status = DownloadStatus::Error;
                entry.error = Some(e.to_string());
                Some(EngineEvent::DownloadError { id: entry.id.clone(), error: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use storage::Chunk;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn supervisor(download_folder: PathBuf, temp_folder: PathBuf) -> Supervisor {
        Supervisor::new(Client::new(), Config { download_folder, temp_folder }, 4)
    }

    #[tokio::test]
    async fn plan_rejects_sources_without_range_support() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/a.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-length", "100"))
            .mount(&server)
            .await;

        let download_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(download_dir.path().to_path_buf(), temp_dir.path().to_path_buf());

        let result = supervisor.plan("1".to_string(), format!("{}/a.bin", server.uri())).await;
        assert!(matches!(result, Err(DownloadError::UnsupportedRangedFetch { .. })));
    }

    #[tokio::test]
    async fn plan_builds_a_queued_entry_with_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/a.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("accept-ranges", "bytes")
                    .insert_header("content-length", "1000"),
            )
            .mount(&server)
            .await;

        let download_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(download_dir.path().to_path_buf(), temp_dir.path().to_path_buf());

        let entry = supervisor
            .plan("1".to_string(), format!("{}/a.bin", server.uri()))
            .await
            .unwrap();

        assert_eq!(entry.status, DownloadStatus::Queued);
        assert_eq!(entry.total_size, 1000);
        assert_eq!(entry.chunks.len(), 4);
        assert!(entry.temp_dir.is_some());
        assert!(tokio::fs::metadata(entry.temp_dir.as_ref().unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn check_if_complete_returns_none_while_chunks_are_incomplete() {
        let download_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(download_dir.path().to_path_buf(), temp_dir.path().to_path_buf());

        let mut entry = DownloadEntry {
            id: "1".to_string(),
            url: "https://example.com/a.bin".to_string(),
            filename: "a.bin".to_string(),
            final_path: download_dir.path().join("a.bin"),
            temp_dir: Some(temp_dir.path().to_path_buf()),
            total_size: 10,
            downloaded_size: 0,
            status: DownloadStatus::Downloading,
            current_speed: 0,
            error: None,
            chunks: vec![Chunk::new(0, 0, 9)],
        };

        let event = supervisor.check_if_complete(&mut entry).await;
        assert!(event.is_none());
        assert_eq!(entry.status, DownloadStatus::Downloading);
    }

    #[tokio::test]
    async fn check_if_complete_assembles_and_transitions_to_complete() {
        let download_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(temp_dir.path().join("part_0"), vec![1u8; 10]).await.unwrap();

        let supervisor = supervisor(download_dir.path().to_path_buf(), temp_dir.path().to_path_buf());

        let mut chunk = Chunk::new(0, 0, 9);
        chunk.downloaded = 10;
        let mut entry = DownloadEntry {
            id: "1".to_string(),
            url: "https://example.com/a.bin".to_string(),
            filename: "a.bin".to_string(),
            final_path: download_dir.path().join("a.bin"),
            temp_dir: Some(temp_dir.path().to_path_buf()),
            total_size: 10,
            downloaded_size: 10,
            status: DownloadStatus::Downloading,
            current_speed: 5,
            error: None,
            chunks: vec![chunk],
        };

        let event = supervisor.check_if_complete(&mut entry).await;
        assert!(matches!(event, Some(EngineEvent::DownloadComplete { .. })));
        assert_eq!(entry.status, DownloadStatus::Complete);
        assert!(entry.temp_dir.is_none());
        assert!(tokio::fs::metadata(&entry.final_path).await.is_ok());
    }

    #[test]
    fn pause_flips_cancel_flags_and_marks_chunks_paused() {
        let active = ActiveStreams::new();
        let handles = ChunkHandles::new(0);
        active.insert(("1".to_string(), 0), handles.clone());

        let mut chunk = Chunk::new(0, 0, 9);
        chunk.status = ChunkStatus::Downloading;
        let mut entry = DownloadEntry {
            id: "1".to_string(),
            url: "https://example.com/a.bin".to_string(),
            filename: "a.bin".to_string(),
            final_path: PathBuf::from("a.bin"),
            temp_dir: None,
            total_size: 10,
            downloaded_size: 0,
            status: DownloadStatus::Downloading,
            current_speed: 5,
            error: None,
            chunks: vec![chunk],
        };

        let supervisor =
            Supervisor::new(Client::new(), Config { download_folder: PathBuf::from("."), temp_folder: PathBuf::from(".") }, 4);
        supervisor.pause(&mut entry, &active);

        assert!(handles.cancel.load(std::sync::atomic::Ordering::Acquire));
        assert_eq!(entry.status, DownloadStatus::Paused);
        assert_eq!(entry.chunks[0].status, ChunkStatus::Paused);
        assert_eq!(entry.current_speed, 0);
    }
}
