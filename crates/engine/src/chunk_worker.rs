//! Chunk Worker: fetches one byte range of one download, appending to its
//! part file. Cancellable, no internal retry — a failed chunk fails the
//! download (§4.2).

use futures_util::StreamExt;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum interval between speed-window recomputations.
const SPEED_WINDOW: std::time::Duration = std::time::Duration::from_millis(500);

/// Shared handles a Supervisor uses to observe and cancel a running chunk.
#[derive(Clone)]
pub struct ChunkHandles {
    pub downloaded: Arc<AtomicU64>,
    pub speed: Arc<AtomicU64>,
    pub cancel: Arc<AtomicBool>,
}

impl ChunkHandles {
    pub fn new(initial_downloaded: u64) -> Self {
        Self {
            downloaded: Arc::new(AtomicU64::new(initial_downloaded)),
            speed: Arc::new(AtomicU64::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Terminal outcome of one chunk worker, reported back to the single
/// command-processing loop so the Supervisor applies the mutation.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// The chunk finished; its part file holds exactly its assigned range.
    Complete { entry_id: String, chunk_id: u8 },
    /// Pre-body request failure — fatal for the whole entry (§4.2, §7).
    RequestFailed { entry_id: String, chunk_id: u8, message: String },
    /// Mid-body stream failure — the chunk failed; the entry fails too.
    StreamFailed { entry_id: String, chunk_id: u8, message: String },
}

pub struct ChunkWorker {
    pub entry_id: String,
    pub chunk_id: u8,
    pub start: u64,
    pub end: u64,
    pub url: String,
    pub part_path: PathBuf,
    pub client: Client,
    pub handles: ChunkHandles,
    pub outcome_tx: mpsc::Sender<WorkerOutcome>,
}

impl ChunkWorker {
    /// Runs the fetch to completion, cancellation, or failure. Never panics
    /// on network/IO error — every failure path reports a [`WorkerOutcome`].
    pub async fn run(self) {
        let downloaded = self.handles.downloaded.load(Ordering::Acquire);
        let resume_at = self.start + downloaded;

        if resume_at > self.end {
            let _ = self
                .outcome_tx
                .send(WorkerOutcome::Complete { entry_id: self.entry_id, chunk_id: self.chunk_id })
                .await;
            return;
        }

        let range = format!("bytes={}-{}", resume_at, self.end);
        debug!(entry = %self.entry_id, chunk = self.chunk_id, %range, "starting chunk fetch");

        let response = match self.client.get(&self.url).header("Range", range).send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = self
                    .outcome_tx
                    .send(WorkerOutcome::RequestFailed {
                        entry_id: self.entry_id,
                        chunk_id: self.chunk_id,
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() && status.as_u16() != 206 {
            let _ = self
                .outcome_tx
                .send(WorkerOutcome::RequestFailed {
                    entry_id: self.entry_id,
                    chunk_id: self.chunk_id,
                    message: format!("unexpected status {status}"),
                })
                .await;
            return;
        }

        let mut file = match OpenOptions::new().create(true).append(true).open(&self.part_path).await {
            Ok(f) => f,
            Err(e) => {
                let _ = self
                    .outcome_tx
                    .send(WorkerOutcome::RequestFailed {
                        entry_id: self.entry_id,
                        chunk_id: self.chunk_id,
                        message: format!("failed to open part file: {e}"),
                    })
                    .await;
                return;
            }
        };

        let mut stream = response.bytes_stream();
        let mut last_timestamp = Instant::now();
        let mut last_downloaded = downloaded;

        loop {
            if self.handles.cancel.load(Ordering::Acquire) {
                info!(entry = %self.entry_id, chunk = self.chunk_id, "chunk cancelled");
                return;
            }

            let next = stream.next().await;
            let data = match next {
                None => break,
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    warn!(entry = %self.entry_id, chunk = self.chunk_id, "stream error: {e}");
                    let _ = self
                        .outcome_tx
                        .send(WorkerOutcome::StreamFailed {
                            entry_id: self.entry_id,
                            chunk_id: self.chunk_id,
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            if let Err(e) = file.write_all(&data).await {
                let _ = self
                    .outcome_tx
                    .send(WorkerOutcome::StreamFailed {
                        entry_id: self.entry_id,
                        chunk_id: self.chunk_id,
                        message: format!("write failed: {e}"),
                    })
                    .await;
                return;
            }

            let total = self.handles.downloaded.fetch_add(data.len() as u64, Ordering::AcqRel) + data.len() as u64;

            let elapsed = last_timestamp.elapsed();
            if elapsed > SPEED_WINDOW {
                let speed = ((total - last_downloaded) as f64 / elapsed.as_secs_f64()) as u64;
                self.handles.speed.store(speed, Ordering::Release);
                last_timestamp = Instant::now();
                last_downloaded = total;
            }
        }

        if let Err(e) = file.flush().await {
            let _ = self
                .outcome_tx
                .send(WorkerOutcome::StreamFailed {
                    entry_id: self.entry_id,
                    chunk_id: self.chunk_id,
                    message: format!("flush failed: {e}"),
                })
                .await;
            return;
        }

        self.handles.speed.store(0, Ordering::Release);
        info!(entry = %self.entry_id, chunk = self.chunk_id, "chunk complete");
        let _ = self
            .outcome_tx
            .send(WorkerOutcome::Complete { entry_id: self.entry_id, chunk_id: self.chunk_id })
            .await;
    }
}
