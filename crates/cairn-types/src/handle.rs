use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::entity::Entity;

/// A shared, mutable reference to a loaded entity.
///
/// Handles are what the identity map hands out: two handles obtained for the
/// same path within one repository instance point at the same allocation,
/// so edits made through one are visible through the other.
#[derive(Clone)]
pub struct EntityHandle(Arc<RwLock<Entity>>);

impl EntityHandle {
    pub fn new(entity: Entity) -> Self {
        Self(Arc::new(RwLock::new(entity)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Entity> {
        self.0.read().expect("lock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Entity> {
        self.0.write().expect("lock poisoned")
    }

    /// Clone the current state of the entity out of the handle.
    pub fn snapshot(&self) -> Entity {
        self.read().clone()
    }

    /// `true` if both handles refer to the same in-memory instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn path(&self) -> Option<String> {
        self.read().path().map(str::to_string)
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.read().uuid
    }
}

impl From<Entity> for EntityHandle {
    fn from(entity: Entity) -> Self {
        Self::new(entity)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = self.read();
        f.debug_struct("EntityHandle")
            .field("path", &entity.path())
            .field("uuid", &entity.uuid)
            .field("kind", &entity.kind_tag())
            .finish()
    }
}
