//! Per-request identity map.

use std::collections::HashMap;
use std::sync::RwLock;

use cairn_types::EntityHandle;

/// Maps storage paths to the entity instances loaded for them.
///
/// Within one repository instance, every lookup of a watched path yields the
/// same [`EntityHandle`], so callers can never hold two diverging copies of
/// one entity. The map is keyed by path only; moving or deleting an entity
/// must evict the old key.
#[derive(Debug, Default)]
pub struct Watcher {
    entries: RwLock<HashMap<String, EntityHandle>>,
}

impl Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<EntityHandle> {
        self.entries.read().expect("lock poisoned").get(path).cloned()
    }

    /// Register `handle` under its current path, replacing any previous
    /// instance. Returns `false` (and registers nothing) for a pathless
    /// entity.
    pub fn add(&self, handle: &EntityHandle) -> bool {
        let Some(path) = handle.path() else {
            return false;
        };
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(path, handle.clone());
        true
    }

    pub fn remove(&self, path: &str) -> Option<EntityHandle> {
        self.entries.write().expect("lock poisoned").remove(path)
    }

    /// Remove `path` and every watched path below it. Returns the number of
    /// evicted entries.
    pub fn remove_subtree(&self, path: &str) -> usize {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let mut entries = self.entries.write().expect("lock poisoned");
        let before = entries.len();
        entries.retain(|k, _| k != path && !k.starts_with(&prefix));
        before - entries.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().expect("lock poisoned").contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}
