use std::io::Read;

use cairn_store::{Mtime, StoreError};
use cairn_types::EntityHandle;

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;

impl Repository {
    fn committed_resource_path(&self, entity: &EntityHandle, name: &str) -> RepoResult<String> {
        let owner = entity.path().ok_or(RepoError::MissingPath)?;
        self.paths.validate_name(name)?;
        if name == self.config.object_filename {
            return Err(RepoError::invalid_path(name, "reserved for the entity object"));
        }
        Ok(self.paths.join(&owner, name))
    }

    /// Committed bytes of resource `name` of `entity`.
    pub fn get_resource(&self, entity: &EntityHandle, name: &str) -> RepoResult<Vec<u8>> {
        let path = self.committed_resource_path(entity, name)?;
        match self.storage.get(&path) {
            Ok(data) => Ok(data),
            Err(StoreError::NotFound(_)) => Err(RepoError::ResourceNotFound(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream the committed content of resource `name`.
    pub fn read_resource(&self, entity: &EntityHandle, name: &str) -> RepoResult<Box<dyn Read + Send>> {
        let path = self.committed_resource_path(entity, name)?;
        match self.storage.read(&path) {
            Ok(reader) => Ok(reader),
            Err(StoreError::NotFound(_)) => Err(RepoError::ResourceNotFound(path)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_resource(&self, entity: &EntityHandle, name: &str) -> RepoResult<bool> {
        let path = self.committed_resource_path(entity, name)?;
        Ok(self.storage.is_object(&path)?)
    }

    pub fn get_resource_mtime(&self, entity: &EntityHandle, name: &str) -> RepoResult<Option<Mtime>> {
        let path = self.committed_resource_path(entity, name)?;
        if !self.storage.is_object(&path)? {
            return Ok(None);
        }
        Ok(self.storage.mtime(&path)?)
    }

    /// Names of the committed resources of `entity`, sorted.
    pub fn list_resources(&self, entity: &EntityHandle) -> RepoResult<Vec<String>> {
        let owner = entity.path().ok_or(RepoError::MissingPath)?;
        let mut names = Vec::new();
        for name in self.storage.scan(&owner)? {
            if name == self.config.object_filename {
                continue;
            }
            if self.storage.is_object(&self.paths.join(&owner, &name))? {
                names.push(name);
            }
        }
        Ok(names)
    }
}
