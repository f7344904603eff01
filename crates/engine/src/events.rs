//! The command surface clients issue into the engine, and the events it
//! broadcasts back out (§4.5, §6).

use storage::{DownloadEntry, DownloadStatus};

/// Commands accepted on the engine's command channel. The transport that
/// turns these into wire messages lives outside this crate.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    StartDownload { url: String },
    PauseDownload { id: String },
    ResumeDownload { id: String },
    PauseAllDownloads,
    ResumeAllDownloads,
    RemoveDownload { id: String },
}

/// Events broadcast to every subscribed client. Best-effort: a dropped or
/// lagging receiver never affects engine state.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    DownloadList(Vec<DownloadEntry>),
    DownloadStarted(DownloadEntry),
    DownloadProgress {
        id: String,
        progress: f64,
        downloaded: u64,
        total_size: u64,
        speed: u64,
        eta: Option<u64>,
        filename: String,
        status: DownloadStatus,
        error: Option<String>,
    },
    DownloadComplete { id: String, file_path: String },
    DownloadError { id: String, error: String },
    DownloadRemoved { id: String },
    TotalSpeedUpdate { total_speed: u64 },
}

impl EngineEvent {
    pub fn progress_of(entry: &DownloadEntry) -> Self {
        EngineEvent::DownloadProgress {
            id: entry.id.clone(),
            progress: entry.progress_percent(),
            downloaded: entry.downloaded_size,
            total_size: entry.total_size,
            speed: entry.current_speed,
            eta: entry.eta(),
            filename: entry.filename.clone(),
            status: entry.status,
            error: entry.error.clone(),
        }
    }
}
