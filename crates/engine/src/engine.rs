//! The Engine: the single command-processing loop that owns the Registry,
//! drives the Scheduler and Supervisor, and is the only task that calls
//! [`Store::save`] (§4.5, §5).

use crate::chunk_worker::WorkerOutcome;
use crate::events::{ClientCommand, EngineEvent};
use crate::registry::Registry;
use crate::scheduler::{Action, Scheduler};
use crate::supervisor::{ActiveStreams, Supervisor};
use reqwest::Client;
use std::time::Duration;
use storage::{Config, DownloadEntry, DownloadStatus, Store};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 64;
const OUTCOME_CHANNEL_CAPACITY: usize = 256;
const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

/// The client-facing half: commands in, events out. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<ClientCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
    snapshot_tx: mpsc::Sender<oneshot::Sender<Vec<DownloadEntry>>>,
}

impl EngineHandle {
    pub async fn send(&self, command: ClientCommand) -> bool {
        self.command_tx.send(command).await.is_ok()
    }

    /// Subscribes to the broadcast event stream and returns a consistent
    /// snapshot of every known entry, so a new client never misses the
    /// entries that existed before it attached.
    pub async fn subscribe(&self) -> (broadcast::Receiver<EngineEvent>, Vec<DownloadEntry>) {
        let receiver = self.event_tx.subscribe();
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.snapshot_tx.send(reply_tx).await;
        let snapshot = reply_rx.await.unwrap_or_default();
        (receiver, snapshot)
    }
}

pub struct Engine {
    registry: Registry,
    supervisor: Supervisor,
    scheduler: Scheduler,
    active: ActiveStreams,
    store: Store,
    command_rx: mpsc::Receiver<ClientCommand>,
    outcome_tx: mpsc::Sender<WorkerOutcome>,
    outcome_rx: mpsc::Receiver<WorkerOutcome>,
    snapshot_rx: mpsc::Receiver<oneshot::Sender<Vec<DownloadEntry>>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Loads the persistent store, normalizes recovered entries, and
    /// returns the driver paired with the handle clients talk to. Callers
    /// spawn [`Engine::run`] to start the command loop.
    pub async fn new(config: &Config) -> (Self, EngineHandle) {
        let store = Store::new(config.store_path());
        let loaded = match store.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to load persistent store, starting empty: {e}");
                Vec::new()
            }
        };
        let registry = Registry::from_loaded(loaded);

        let client = Client::new();
        let supervisor = Supervisor::new(client, config.clone(), storage::NUM_CHUNKS);
        let scheduler = Scheduler::new(storage::MAX_CONCURRENT_DOWNLOADS);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let handle = EngineHandle { command_tx, event_tx: event_tx.clone(), snapshot_tx };

        let engine = Self {
            registry,
            supervisor,
            scheduler,
            active: ActiveStreams::new(),
            store,
            command_rx,
            outcome_tx,
            outcome_rx,
            snapshot_rx,
            event_tx,
        };

        (engine, handle)
    }

    /// The command loop. Runs until every `EngineHandle` is dropped.
    pub async fn run(mut self) {
        let mut ticker = interval(BROADCAST_INTERVAL);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            info!("all engine handles dropped, shutting down");
                            break;
                        }
                    }
                }
                outcome = self.outcome_rx.recv() => {
                    if let Some(outcome) = outcome {
                        self.handle_outcome(outcome).await;
                    }
                }
                reply = self.snapshot_rx.recv() => {
                    if let Some(reply) = reply {
                        let _ = reply.send(self.registry.snapshot());
                    }
                }
                _ = ticker.tick() => {
                    self.broadcast_progress();
                }
            }
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::StartDownload { url } => self.start_download(url).await,
            ClientCommand::PauseDownload { id } => self.pause_download(&id).await,
            ClientCommand::ResumeDownload { id } => self.resume_download(&id).await,
            ClientCommand::PauseAllDownloads => self.pause_all().await,
            ClientCommand::ResumeAllDownloads => self.resume_all().await,
            ClientCommand::RemoveDownload { id } => self.remove_download(&id).await,
        }
    }

    async fn start_download(&mut self, url: String) {
        let id = self.registry.allocate_id();
        match self.supervisor.plan(id.clone(), url.clone()).await {
            Ok(entry) => {
                self.registry.insert(id, entry.clone());
                self.persist().await;
                self.broadcast(EngineEvent::DownloadStarted(entry));
                self.run_scheduler().await;
            }
            Err(e) => {
                error!(%url, "failed to plan download: {e}");
            }
        }
    }

    async fn pause_download(&mut self, id: &str) {
        let Some(entry) = self.registry.get_mut(id) else {
            warn!(%id, "pause requested for unknown download");
            return;
        };
        if entry.status != DownloadStatus::Downloading {
            return;
        }
        self.supervisor.pause(entry, &self.active);
        self.persist().await;
        if let Some(entry) = self.registry.get(id) {
            self.broadcast(EngineEvent::progress_of(entry));
        }
    }

    async fn resume_download(&mut self, id: &str) {
        let Some(entry) = self.registry.get_mut(id) else {
            warn!(%id, "resume requested for unknown download");
            return;
        };
        if !matches!(entry.status, DownloadStatus::Paused | DownloadStatus::Error) {
            return;
        }
        entry.status = DownloadStatus::Queued;
        entry.error = None;
        self.persist().await;
        self.run_scheduler().await;
    }

    async fn pause_all(&mut self) {
        let downloading: Vec<String> = self
            .registry
            .iter_in_order()
            .filter(|(_, e)| e.status == DownloadStatus::Downloading)
            .map(|(id, _)| id.clone())
            .collect();
        for id in downloading {
            self.pause_download(&id).await;
        }

        let queued: Vec<String> = self
            .registry
            .iter_in_order()
            .filter(|(_, e)| e.status == DownloadStatus::Queued)
            .map(|(id, _)| id.clone())
            .collect();
        for id in queued {
            if let Some(entry) = self.registry.get_mut(&id) {
                entry.status = DownloadStatus::Paused;
            }
        }
        self.persist().await;
    }

    async fn resume_all(&mut self) {
        let paused: Vec<String> = self
            .registry
            .iter_in_order()
            .filter(|(_, e)| e.status == DownloadStatus::Paused)
            .map(|(id, _)| id.clone())
            .collect();
        for id in paused {
            if let Some(entry) = self.registry.get_mut(&id) {
                entry.status = DownloadStatus::Queued;
            }
        }
        self.persist().await;
        self.run_scheduler().await;
    }

    async fn remove_download(&mut self, id: &str) {
        let Some(mut entry) = self.registry.remove(id) else {
            warn!(%id, "remove requested for unknown download");
            return;
        };
        if entry.status == DownloadStatus::Downloading {
            self.supervisor.pause(&mut entry, &self.active);
        }
        if let Some(temp_dir) = entry.temp_dir.take() {
            if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(%id, "failed to remove temp dir on delete: {e}");
                }
            }
        }
        self.persist().await;
        self.broadcast(EngineEvent::DownloadRemoved { id: id.to_string() });
        self.run_scheduler().await;
    }

    async fn run_scheduler(&mut self) {
        let actions = self.scheduler.try_to_start_queued_downloads(&self.registry);
        if actions.is_empty() {
            return;
        }

        let mut terminal_events = Vec::new();
        for action in actions {
            let Action::Start(id) = action;
            let Some(entry) = self.registry.get_mut(&id) else { continue };
            self.supervisor.start(entry, self.outcome_tx.clone(), &self.active);
            let snapshot = entry.clone();
            self.broadcast(EngineEvent::DownloadStarted(snapshot));

            // A source with no chunks (e.g. a 0-byte file) never spawns a
            // worker, so there is no WorkerOutcome to drive it to Complete.
            if let Some(entry) = self.registry.get_mut(&id) {
                if let Some(event) = self.supervisor.check_if_complete(entry).await {
                    terminal_events.push(event);
                }
            }
        }
        self.persist().await;
        for event in terminal_events {
            self.broadcast(event);
        }
    }

    async fn handle_outcome(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Complete { entry_id, chunk_id } => self.on_chunk_complete(entry_id, chunk_id).await,
            WorkerOutcome::RequestFailed { entry_id, chunk_id, message } => {
                self.on_chunk_failed(entry_id, chunk_id, message).await
            }
            WorkerOutcome::StreamFailed { entry_id, chunk_id, message } => {
                self.on_chunk_failed(entry_id, chunk_id, message).await
            }
        }
    }

    async fn on_chunk_complete(&mut self, entry_id: String, chunk_id: u8) {
        if let Some((_, handles)) = self.active.remove(&(entry_id.clone(), chunk_id)) {
            if let Some(entry) = self.registry.get_mut(&entry_id) {
                if let Some(chunk) = entry.chunks.iter_mut().find(|c| c.id == chunk_id) {
                    chunk.downloaded = handles.downloaded.load(std::sync::atomic::Ordering::Acquire);
                    chunk.current_speed = 0;
                    chunk.status = storage::ChunkStatus::Complete;
                }
                entry.recompute_aggregate();
            }
        }

        let terminal_event = if let Some(entry) = self.registry.get_mut(&entry_id) {
            self.supervisor.check_if_complete(entry).await
        } else {
            None
        };

        self.persist().await;
        if let Some(event) = terminal_event {
            self.broadcast(event);
            self.run_scheduler().await;
        }
    }

    async fn on_chunk_failed(&mut self, entry_id: String, chunk_id: u8, message: String) {
        error!(id = %entry_id, chunk = chunk_id, "{message}");
        self.active.remove(&(entry_id.clone(), chunk_id));
        let error = format!("Chunk {chunk_id} failed: {message}");

        let Some(entry) = self.registry.get_mut(&entry_id) else { return };
        for active_chunk in self.active.iter() {
            if active_chunk.key().0 == entry_id {
                active_chunk.value().cancel.store(true, std::sync::atomic::Ordering::Release);
            }
        }
        entry.status = DownloadStatus::Error;
        entry.error = Some(error.clone());
        entry.current_speed = 0;

        self.persist().await;
        self.broadcast(EngineEvent::DownloadError { id: entry_id, error });
        self.run_scheduler().await;
    }

    fn broadcast_progress(&mut self) {
        let downloading: Vec<String> = self
            .registry
            .iter_in_order()
            .filter(|(_, e)| e.status == DownloadStatus::Downloading)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &downloading {
            self.refresh_entry_progress(id);
        }

        let mut total_speed = 0u64;
        for id in &downloading {
            if let Some(refreshed) = self.registry.get(id) {
                total_speed += refreshed.current_speed;
                self.event_tx.send(EngineEvent::progress_of(refreshed)).ok();
            }
        }

        self.event_tx.send(EngineEvent::TotalSpeedUpdate { total_speed }).ok();
    }

    fn refresh_entry_progress(&mut self, id: &str) {
        let Some(entry) = self.registry.get_mut(id) else { return };
        for chunk in entry.chunks.iter_mut() {
            if chunk.status != storage::ChunkStatus::Downloading {
                continue;
            }
            if let Some(handles) = self.active.get(&(id.to_string(), chunk.id)) {
                chunk.downloaded = handles.downloaded.load(std::sync::atomic::Ordering::Acquire);
                chunk.current_speed = handles.speed.load(std::sync::atomic::Ordering::Acquire);
            }
        }
        entry.recompute_aggregate();
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.registry.for_persist()).await {
            error!("failed to persist registry: {e}");
        }
    }

    fn broadcast(&self, event: EngineEvent) {
        self.event_tx.send(event).ok();
    }
}
