//! Fixtures shared by the unit tests of this crate.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use cairn_store::{InMemoryStorage, Mtime, StoreError, StoreResult, Storage};
use cairn_types::{Document, Entity, EntityHandle, EntityKind, Folder};

use crate::repository::Repository;

/// In-memory storage that fails selected operations on demand.
#[derive(Debug, Default)]
pub(crate) struct FaultyStorage {
    pub inner: InMemoryStorage,
    fail_move_to: Mutex<Option<String>>,
    fail_set_prefix: Mutex<Option<String>>,
}

impl FaultyStorage {
    pub fn wrap(inner: InMemoryStorage) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// Fail every move whose destination is exactly `path`.
    pub fn fail_move_to(&self, path: &str) {
        *self.fail_move_to.lock().unwrap() = Some(path.to_string());
    }

    /// Fail every `set` of a path starting with `prefix`.
    pub fn fail_set_with_prefix(&self, prefix: &str) {
        *self.fail_set_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    fn injected(path: &str) -> StoreError {
        StoreError::Backend(format!("injected failure at {path}"))
    }
}

impl Storage for FaultyStorage {
    fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(path)
    }

    fn set(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        if let Some(prefix) = self.fail_set_prefix.lock().unwrap().as_deref() {
            if path.starts_with(prefix) {
                return Err(Self::injected(path));
            }
        }
        self.inner.set(path, data)
    }

    fn move_path(&self, from: &str, to: &str) -> StoreResult<bool> {
        if self.fail_move_to.lock().unwrap().as_deref() == Some(to) {
            return Err(Self::injected(to));
        }
        self.inner.move_path(from, to)
    }

    fn copy(&self, from: &str, to: &str) -> StoreResult<bool> {
        self.inner.copy(from, to)
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        self.inner.remove(path)
    }

    fn contains(&self, path: &str) -> StoreResult<bool> {
        self.inner.contains(path)
    }

    fn is_object(&self, path: &str) -> StoreResult<bool> {
        self.inner.is_object(path)
    }

    fn scan(&self, path: &str) -> StoreResult<Vec<String>> {
        self.inner.scan(path)
    }

    fn mtime(&self, path: &str) -> StoreResult<Option<Mtime>> {
        self.inner.mtime(path)
    }

    fn read(&self, path: &str) -> StoreResult<Box<dyn Read + Send>> {
        self.inner.read(path)
    }

    fn write(&self, path: &str) -> StoreResult<Box<dyn Write + Send>> {
        self.inner.write(path)
    }
}

pub(crate) fn memory_repo() -> (InMemoryStorage, Repository) {
    let storage = InMemoryStorage::new();
    let repo = Repository::new(Arc::new(storage.clone())).unwrap();
    (storage, repo)
}

pub(crate) fn document(path: &str, title: &str) -> EntityHandle {
    EntityHandle::new(Entity::new(EntityKind::Document(Document::new(title))).with_path(path))
}

pub(crate) fn folder(path: &str, title: &str) -> EntityHandle {
    EntityHandle::new(Entity::new(EntityKind::Folder(Folder::new(title))).with_path(path))
}

/// Stage and commit a batch of entities.
pub(crate) fn commit_all(repo: &mut Repository, handles: &[&EntityHandle]) {
    for handle in handles {
        repo.save_entity(handle).unwrap();
    }
    repo.commit().unwrap();
}

/// Storage keys left behind by temporary writes or quarantine.
pub(crate) fn leftovers(storage: &InMemoryStorage) -> Vec<String> {
    let is_suffix = |s: &str| s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit());
    storage
        .all_paths()
        .into_iter()
        .filter(|p| p.starts_with("/_tmp/") || p.split('.').any(is_suffix))
        .collect()
}
