//! Queue Scheduler: admits at most `max_concurrent` downloads into
//! `Downloading` at a time, promoting `Queued` entries in registration
//! order (§4.4). A pure function over registry state — no I/O, no
//! mutation — so the caller decides how and when to act on its output.

use crate::registry::Registry;
use storage::DownloadStatus;

/// One decision the caller should execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start(String),
}

pub struct Scheduler {
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Fills remaining admission slots with the oldest `Queued` entries.
    pub fn try_to_start_queued_downloads(&self, registry: &Registry) -> Vec<Action> {
        let active = registry.iter_in_order().filter(|(_, e)| e.status == DownloadStatus::Downloading).count();

        let available = self.max_concurrent.saturating_sub(active);
        if available == 0 {
            return Vec::new();
        }

        registry
            .iter_in_order()
            .filter(|(_, e)| e.status == DownloadStatus::Queued)
            .take(available)
            .map(|(id, _)| Action::Start(id.clone()))
            .collect()
    }
}
