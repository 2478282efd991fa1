//! Adapter registry: at most one live handle per location.

use super::live_adapter::LiveAdapter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Mapping from location key to live adapter.
///
/// The lock is held only for the map operation itself, never across a
/// network call. Check-then-insert happens under a single acquisition.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    entries: Mutex<HashMap<String, Arc<LiveAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the entry for `location`.
    pub fn get(&self, location: &str) -> Option<Arc<LiveAdapter>> {
        self.entries.lock().get(location).cloned()
    }

    pub fn contains(&self, location: &str) -> bool {
        self.entries.lock().contains_key(location)
    }

    /// Insert unless the location already has an entry.
    ///
    /// On conflict the rejected adapter is handed back so the caller can close it.
    pub fn try_insert(&self, adapter: Arc<LiveAdapter>) -> Result<(), Arc<LiveAdapter>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(adapter.location()) {
            return Err(adapter);
        }
        entries.insert(adapter.location().to_string(), adapter);
        Ok(())
    }

    /// Remove the entry only if it is still `adapter` (not a newer replacement).
    pub fn remove_if_same(&self, adapter: &Arc<LiveAdapter>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(adapter.location()) {
            Some(current) if Arc::ptr_eq(current, adapter) => {
                entries.remove(adapter.location());
                true
            }
            _ => false,
        }
    }

    /// Remove every entry whose location is not in `configured`.
    pub fn evict_unconfigured(&self, configured: &HashSet<&str>) -> Vec<Arc<LiveAdapter>> {
        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .keys()
            .filter(|location| !configured.contains(location.as_str()))
            .cloned()
            .collect();
        stale
            .into_iter()
            .filter_map(|location| entries.remove(&location))
            .collect()
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<Arc<LiveAdapter>> {
        self.entries.lock().drain().map(|(_, adapter)| adapter).collect()
    }

    /// Registered locations, sorted.
    pub fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.entries.lock().keys().cloned().collect();
        locations.sort();
        locations
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
