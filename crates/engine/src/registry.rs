//! Registry: the in-memory id → entry map, plus registration order and
//! monotonic id allocation (§4.5, §3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use storage::DownloadEntry;

/// Owns every known download entry. Lives inside [`crate::engine::Engine`]
/// and is touched only from its single command-processing loop.
pub struct Registry {
    entries: HashMap<String, DownloadEntry>,
    /// Insertion order, oldest first — the order the Scheduler admits in.
    order: Vec<String>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: HashMap::new(), order: Vec::new(), next_id: AtomicU64::new(1) }
    }

    /// Rebuilds a registry from entries loaded from the persistent store,
    /// preserving their stored order and seeding the id counter above the
    /// highest id seen so newly allocated ids never collide.
    pub fn from_loaded(loaded: Vec<(String, DownloadEntry)>) -> Self {
        let mut registry = Self::new();
        let mut max_seen = 0u64;
        for (id, entry) in loaded {
            if let Ok(n) = id.parse::<u64>() {
                max_seen = max_seen.max(n);
            }
            registry.order.push(id.clone());
            registry.entries.insert(id, entry);
        }
        registry.next_id.store(max_seen + 1, Ordering::Relaxed);
        registry
    }

    /// Allocates the next monotonic id without inserting an entry yet.
    pub fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    pub fn insert(&mut self, id: String, entry: DownloadEntry) {
        if !self.entries.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.entries.insert(id, entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<DownloadEntry> {
        self.order.retain(|existing| existing != id);
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&DownloadEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DownloadEntry> {
        self.entries.get_mut(id)
    }

    /// Entries in registration order, the order the Scheduler admits in.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&String, &DownloadEntry)> {
        self.order.iter().filter_map(move |id| self.entries.get(id).map(|e| (id, e)))
    }

    pub fn snapshot(&self) -> Vec<DownloadEntry> {
        self.iter_in_order().map(|(_, e)| e.clone()).collect()
    }

    /// Pairs suitable for `Store::save` — ordered, matching on-disk format.
    pub fn for_persist(&self) -> Vec<(String, DownloadEntry)> {
        self.iter_in_order().map(|(id, e)| (id.clone(), e.clone())).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{Chunk, DownloadStatus};
    use std::path::PathBuf;

    fn entry(id: &str) -> DownloadEntry {
        DownloadEntry {
            id: id.to_string(),
            url: format!("https://example.com/{id}"),
            filename: id.to_string(),
            final_path: PathBuf::from(id),
            temp_dir: None,
            total_size: 10,
            downloaded_size: 0,
            status: DownloadStatus::Queued,
            current_speed: 0,
            error: None,
            chunks: vec![Chunk::new(0, 0, 9)],
        }
    }

    #[test]
    fn allocate_id_is_monotonic() {
        let registry = Registry::new();
        assert_eq!(registry.allocate_id(), "1");
        assert_eq!(registry.allocate_id(), "2");
        assert_eq!(registry.allocate_id(), "3");
    }

    #[test]
    fn from_loaded_seeds_counter_above_highest_existing_id() {
        let registry = Registry::from_loaded(vec![("5".to_string(), entry("5")), ("2".to_string(), entry("2"))]);
        assert_eq!(registry.allocate_id(), "6");
    }

    #[test]
    fn iter_in_order_matches_insertion_order() {
        let mut registry = Registry::new();
        registry.insert("b".to_string(), entry("b"));
        registry.insert("a".to_string(), entry("a"));
        let ids: Vec<_> = registry.iter_in_order().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn remove_drops_entry_and_order_slot() {
        let mut registry = Registry::new();
        registry.insert("a".to_string(), entry("a"));
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert_eq!(registry.iter_in_order().count(), 0);
    }
}
