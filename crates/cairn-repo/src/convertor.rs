use std::collections::HashMap;
use std::sync::RwLock;

use cairn_types::Uuid;

use crate::error::RepoResult;

/// Bidirectional UUID/path lookup kept in step with committed changes.
pub trait UuidConvertor: Send + Sync {
    /// Map `uuid` to `path`, replacing any previous mapping of either side.
    fn set(&self, uuid: Uuid, path: &str) -> RepoResult<()>;

    fn remove_by_uuid(&self, uuid: &Uuid) -> RepoResult<bool>;

    fn get_path(&self, uuid: &Uuid) -> RepoResult<Option<String>>;

    fn get_uuid(&self, path: &str) -> RepoResult<Option<Uuid>>;
}

#[derive(Debug, Default)]
struct Maps {
    by_uuid: HashMap<Uuid, String>,
    by_path: HashMap<String, Uuid>,
}

/// Process-local convertor.
#[derive(Debug, Default)]
pub struct InMemoryUuidConvertor {
    maps: RwLock<Maps>,
}

impl InMemoryUuidConvertor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.maps.read().expect("lock poisoned").by_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UuidConvertor for InMemoryUuidConvertor {
    fn set(&self, uuid: Uuid, path: &str) -> RepoResult<()> {
        let mut maps = self.maps.write().expect("lock poisoned");
        if let Some(old_path) = maps.by_uuid.insert(uuid, path.to_string()) {
            maps.by_path.remove(&old_path);
        }
        if let Some(old_uuid) = maps.by_path.insert(path.to_string(), uuid) {
            if old_uuid != uuid {
                maps.by_uuid.remove(&old_uuid);
            }
        }
        Ok(())
    }

    fn remove_by_uuid(&self, uuid: &Uuid) -> RepoResult<bool> {
        let mut maps = self.maps.write().expect("lock poisoned");
        match maps.by_uuid.remove(uuid) {
            Some(path) => {
                maps.by_path.remove(&path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_path(&self, uuid: &Uuid) -> RepoResult<Option<String>> {
        Ok(self.maps.read().expect("lock poisoned").by_uuid.get(uuid).cloned())
    }

    fn get_uuid(&self, path: &str) -> RepoResult<Option<Uuid>> {
        Ok(self.maps.read().expect("lock poisoned").by_path.get(path).copied())
    }
}
