//! The commit protocol.
//!
//! A commit runs in phases:
//!
//! 1. Quarantine: every staged delete is moved under the temp area.
//! 2. Prepare: each staged entity is cloned, stamped and serialized to
//!    `<object>.<suffix>`; staged resources are written the same way.
//! 3. Publish: every temporary file is moved onto its final path. An object
//!    being replaced is first copied into the temp area.
//! 4. Sync: the identity map, the cache and the UUID convertor follow.
//! 5. Hooks: every [`CommitHook`](crate::CommitHook) sees the [`CommitDiff`].
//! 6. Reset: buffers are cleared and leftover temporary files purged.
//!
//! A failure in any phase rolls back: quarantined content is moved back and
//! temporary files are purged. A failure inside phase 3 also reverts the
//! objects it already published. Once phase 3 has completed, published
//! objects stay published even if a later phase fails, unless they lie
//! inside a restored subtree: the restored content wins and the identity
//! map, the cache and the UUID convertor forget the overwritten saves.

use std::io::Write;

use cairn_cache::{CacheItem, CachedEntity};
use cairn_store::{copy_stream, StoreError};
use cairn_types::{Entity, EntityHandle, Timestamp, Uuid};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{RepoError, RepoResult};
use crate::hooks::{CommitDiff, RemovedEntity, ResourceChange, ResourceSource};
use crate::repository::{cache_key, Repository};

impl Repository {
    /// Explicit transactions do not exist; staging starts implicitly and
    /// ends with [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn begin(&mut self) -> RepoResult<()> {
        Err(RepoError::BeginUnsupported)
    }

    /// Apply every staged change.
    ///
    /// On failure the changes are rolled back and the original error is
    /// returned.
    pub fn commit(&mut self) -> RepoResult<CommitDiff> {
        let now = Utc::now();
        match self.apply_commit(now) {
            Ok(diff) => {
                self.reset();
                info!(
                    saved = diff.saved_entities.len(),
                    deleted = diff.deleted_entity_paths.len(),
                    resources = diff.saved_resources.len(),
                    "commit complete"
                );
                Ok(diff)
            }
            Err(e) => {
                warn!(error = %e, "commit failed; rolling back");
                self.rollback();
                Err(e)
            }
        }
    }

    /// Restore quarantined deletes and discard everything staged.
    ///
    /// A restored subtree replaces whatever this commit published inside
    /// it, so those saves are dropped from the identity map, the cache and
    /// the UUID convertor. Best effort: a restore that fails is logged and
    /// skipped.
    pub fn rollback(&mut self) {
        let quarantined = std::mem::take(&mut self.staged.tmp_del_files);
        for (original, temp) in &quarantined {
            match self.storage.move_path(temp, original) {
                Ok(true) => {
                    debug!(path = %original, "restored quarantined content");
                    self.forget_saves_within(original);
                    if let Err(e) = self.evict_subtree(original) {
                        warn!(path = %original, error = %e, "cannot evict restored subtree");
                    }
                    self.register_uuids(original);
                }
                Ok(false) => warn!(path = %original, temp = %temp, "quarantined content vanished"),
                Err(e) => warn!(path = %original, temp = %temp, error = %e, "failed to restore"),
            }
        }
        self.reset();
    }

    /// Clear every staging buffer and purge temporary files.
    pub fn reset(&mut self) {
        self.remove_temp_files();
        self.staged.clear();
    }

    /// Delete the temporary and quarantined files of the current commit.
    pub fn remove_temp_files(&mut self) {
        let temps = self
            .staged
            .tmp_files
            .values()
            .chain(self.staged.tmp_del_files.values())
            .chain(self.staged.tmp_backups.values());
        for temp in temps {
            if let Err(e) = self.storage.remove(temp) {
                warn!(path = %temp, error = %e, "failed to remove temporary file");
            }
        }
        self.staged.tmp_files.clear();
        self.staged.tmp_del_files.clear();
        self.staged.tmp_backups.clear();

        let temp_dir = &self.config.temp_dir;
        match self.storage.scan(temp_dir) {
            Ok(names) if names.is_empty() => {
                if let Err(e) = self.storage.remove(temp_dir) {
                    warn!(path = %temp_dir, error = %e, "failed to remove temp area");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(path = %temp_dir, error = %e, "failed to scan temp area"),
        }
    }

    fn apply_commit(&mut self, now: Timestamp) -> RepoResult<CommitDiff> {
        let mut diff = CommitDiff::new(now, self.actor.clone());
        if !self.staged.has_changes() {
            debug!("nothing to commit");
            return Ok(diff);
        }

        self.quarantine_deletes(&mut diff)?;
        let prepared = self.prepare_writes(now, &mut diff)?;
        self.publish()?;
        self.sync_after_publish(prepared, &mut diff)?;

        diff.temp_files = self.staged.tmp_files.clone();
        diff.quarantined = self.staged.tmp_del_files.clone();

        for hook in &self.commit_hooks {
            debug!(hook = hook.name(), "running commit hook");
            hook.on_commit(&diff)?;
        }
        Ok(diff)
    }

    // ---- Phase 1 ----

    fn quarantine_deletes(&mut self, diff: &mut CommitDiff) -> RepoResult<()> {
        for path in self.staged.delete_entity_paths.clone() {
            let removed = self.removed_entities(&path)?;
            let temp = self.quarantine_path();
            if self.storage.move_path(&path, &temp)? {
                debug!(path = %path, temp = %temp, "quarantined entity");
                self.staged.tmp_del_files.insert(path.clone(), temp);
                diff.removed_entities.extend(removed);
            } else {
                debug!(path = %path, "delete of missing entity");
            }
            diff.deleted_entity_paths.push(path);
        }

        for path in self.staged.delete_paths.clone() {
            let temp = self.quarantine_path();
            if self.storage.move_path(&path, &temp)? {
                debug!(path = %path, temp = %temp, "quarantined resource");
                self.staged.tmp_del_files.insert(path.clone(), temp);
            }
            diff.deleted_resource_paths.push(path);
        }
        Ok(())
    }

    fn removed_entities(&self, path: &str) -> RepoResult<Vec<RemovedEntity>> {
        let mut removed = Vec::new();
        match self.load_entity(path) {
            Ok(Some((entity, _))) => removed.push(RemovedEntity {
                path: path.to_string(),
                uuid: entity.uuid,
            }),
            Ok(None) => {}
            Err(e) => {
                warn!(path, error = %e, "deleting unreadable entity");
                removed.push(RemovedEntity {
                    path: path.to_string(),
                    uuid: None,
                });
            }
        }
        let scan = self.get_descendants_from_storage(path, true)?;
        removed.extend(scan.entities.iter().filter_map(|e| {
            e.path().map(|p| RemovedEntity {
                path: p.to_string(),
                uuid: e.uuid,
            })
        }));
        removed.extend(scan.errors.into_iter().map(|(p, _)| RemovedEntity { path: p, uuid: None }));
        Ok(removed)
    }

    // ---- Phase 2 ----

    fn prepare_writes(
        &mut self,
        now: Timestamp,
        diff: &mut CommitDiff,
    ) -> RepoResult<Vec<(String, EntityHandle, Entity)>> {
        let staged: Vec<(String, EntityHandle)> = self
            .staged
            .save_entities
            .iter()
            .map(|(p, h)| (p.clone(), h.clone()))
            .collect();

        let mut prepared = Vec::with_capacity(staged.len());
        for (path, handle) in staged {
            let mut clone = handle.snapshot();
            clone.set_path(path.as_str());
            clone.ensure_uuid(Uuid::now_v7);
            clone.stamp(now, self.actor.as_deref());
            for hook in &self.serialize_hooks {
                hook.pre_serialize(&mut clone)?;
            }
            let data = self.serializer.serialize(&clone)?;
            let object_path = self.object_path(&path);
            let temp = self.register_temp(object_path);
            self.storage.set(&temp, &data)?;
            prepared.push((path, handle, clone));
        }

        for (path, staged) in self.staged.save_data.clone() {
            let temp = self.register_temp(path.clone());
            self.storage.set(&temp, &staged.data)?;
            diff.saved_resources.push(ResourceChange {
                path,
                owner: staged.owner,
                source: ResourceSource::Data,
                size: staged.data.len() as u64,
            });
        }

        let streams = std::mem::take(&mut self.staged.save_streams);
        for (path, mut staged) in streams {
            let temp = self.register_temp(path.clone());
            let mut writer = self.storage.write(&temp)?;
            let size = copy_stream(&mut staged.reader, &mut writer, self.config.stream_chunk_size)?;
            writer.flush()?;
            drop(writer);
            diff.saved_resources.push(ResourceChange {
                path,
                owner: staged.owner,
                source: ResourceSource::Stream,
                size,
            });
        }
        Ok(prepared)
    }

    /// Record a temporary sibling of `final_path` before anything is written
    /// to it, so a partial write is purged too.
    fn register_temp(&mut self, final_path: String) -> String {
        let temp = format!("{final_path}.{}", Uuid::new_v4().simple());
        self.staged.tmp_files.insert(final_path, temp.clone());
        temp
    }

    fn quarantine_path(&self) -> String {
        self.paths
            .join(&self.config.temp_dir, &Uuid::new_v4().simple().to_string())
    }

    // ---- Phase 3 ----

    fn publish(&mut self) -> RepoResult<()> {
        let pending: Vec<(String, String)> = self
            .staged
            .tmp_files
            .iter()
            .map(|(f, t)| (f.clone(), t.clone()))
            .collect();
        let mut published: Vec<String> = Vec::with_capacity(pending.len());
        for (final_path, temp) in pending {
            if let Err(e) = self.publish_one(&final_path, &temp) {
                warn!(
                    published = published.len(),
                    failed = %final_path,
                    error = %e,
                    "publish failed; reverting published objects"
                );
                self.unpublish(&published);
                return Err(e);
            }
            published.push(final_path);
        }
        debug!(published = published.len(), "published objects");
        Ok(())
    }

    /// Move `temp` onto `final_path`, keeping a copy of the object it
    /// replaces in the temp area.
    fn publish_one(&mut self, final_path: &str, temp: &str) -> RepoResult<()> {
        if self.storage.is_object(final_path)? {
            let backup = self.quarantine_path();
            self.staged
                .tmp_backups
                .insert(final_path.to_string(), backup.clone());
            self.storage.copy(final_path, &backup)?;
        }
        if !self.storage.move_path(temp, final_path)? {
            return Err(RepoError::Storage(StoreError::NotFound(temp.to_string())));
        }
        Ok(())
    }

    /// Undo [`publish_one`](Self::publish_one) for `published`, newest
    /// first. Best effort.
    fn unpublish(&self, published: &[String]) {
        for final_path in published.iter().rev() {
            let result = match self.staged.tmp_backups.get(final_path) {
                Some(backup) => self.storage.move_path(backup, final_path),
                None => self.storage.remove(final_path),
            };
            if let Err(e) = result {
                warn!(path = %final_path, error = %e, "failed to revert published object");
            }
        }
    }

    // ---- Phase 4 ----

    fn sync_after_publish(
        &mut self,
        prepared: Vec<(String, EntityHandle, Entity)>,
        diff: &mut CommitDiff,
    ) -> RepoResult<()> {
        for removed in &diff.removed_entities {
            self.watcher.remove(&removed.path);
            self.evict_cache(&removed.path)?;
            if let Some(uuid) = &removed.uuid {
                self.uuids.remove_by_uuid(uuid)?;
            }
        }
        for path in &diff.deleted_entity_paths {
            self.watcher.remove_subtree(path);
            self.evict_cache(path)?;
        }

        for (path, handle, clone) in prepared {
            {
                let mut entity = handle.write();
                entity.adopt_stamps(&clone);
                entity.set_path(path.as_str());
            }
            self.watcher.add(&handle);
            if let Some(cache) = &self.cache {
                let mtime = self.get_storage_mtime(&path)?.unwrap_or_default();
                cache.set_item(
                    &cache_key(&path),
                    CacheItem::Entity(CachedEntity {
                        entity: handle.snapshot(),
                        mtime,
                    }),
                )?;
            }
            if let Some(uuid) = clone.uuid {
                self.uuids.set(uuid, &path)?;
            }
            diff.saved_entities.push(clone);
        }
        Ok(())
    }

    /// Drop every staged save at or below `path` from the identity map, the
    /// cache and the UUID convertor. Best effort.
    fn forget_saves_within(&self, path: &str) {
        let lost = self
            .staged
            .save_entities
            .keys()
            .filter(|p| p.as_str() == path || self.paths.is_descendant(p, path));
        for saved in lost {
            self.watcher.remove(saved);
            if let Err(e) = self.evict_cache(saved) {
                warn!(path = %saved, error = %e, "cannot evict overwritten save");
            }
            match self.uuids.get_uuid(saved) {
                Ok(Some(uuid)) => {
                    if let Err(e) = self.uuids.remove_by_uuid(&uuid) {
                        warn!(path = %saved, error = %e, "cannot drop uuid of overwritten save");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(path = %saved, error = %e, "cannot look up uuid of overwritten save"),
            }
        }
    }

    /// Re-map the UUIDs of the subtree at `path`. Best effort.
    fn register_uuids(&self, path: &str) {
        let entities = match self.subtree_entities(path) {
            Ok(entities) => entities,
            Err(e) => {
                warn!(path, error = %e, "cannot re-register uuids");
                return;
            }
        };
        for entity in entities {
            if let (Some(uuid), Some(p)) = (entity.uuid, entity.path()) {
                if let Err(e) = self.uuids.set(uuid, p) {
                    warn!(path = p, error = %e, "cannot re-register uuid");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepositoryConfig, SerializerKind};
    use crate::hooks::{CommitHook, SerializeHook};
    use crate::testing::{commit_all, document, leftovers, memory_repo, FaultyStorage};
    use cairn_cache::InMemoryCache;
    use cairn_store::{InMemoryStorage, Storage};
    use cairn_types::{EntityKind, PropertyValue, Site};
    use std::io::{Cursor, Read};
    use std::sync::{Arc, Mutex};

    fn faulty_repo() -> (InMemoryStorage, Arc<FaultyStorage>, Repository) {
        let storage = InMemoryStorage::new();
        let faulty = Arc::new(FaultyStorage::wrap(storage.clone()));
        let repo = Repository::new(faulty.clone()).unwrap();
        (storage, faulty, repo)
    }

    struct FailingHook;

    impl CommitHook for FailingHook {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_commit(&self, _diff: &CommitDiff) -> RepoResult<()> {
            Err(RepoError::Hook {
                hook: "failing".into(),
                reason: "refused".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        seen: Mutex<Vec<(usize, usize)>>,
    }

    impl CommitHook for RecordingHook {
        fn name(&self) -> &str {
            "recording"
        }

        fn on_commit(&self, diff: &CommitDiff) -> RepoResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push((diff.saved_entities.len(), diff.deleted_entity_paths.len()));
            Ok(())
        }
    }

    struct StampHook;

    impl SerializeHook for StampHook {
        fn pre_serialize(&self, entity: &mut Entity) -> RepoResult<()> {
            entity.set_property("serialized", true);
            Ok(())
        }

        fn post_unserialize(&self, entity: &mut Entity) -> RepoResult<()> {
            entity.set_property("loaded", true);
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Successful commits
    // -----------------------------------------------------------------------

    #[test]
    fn save_then_delete_page() {
        let (storage, mut repo) = memory_repo();
        let page = document("/site1/ROOT/page1", "Page 1");
        repo.save_entity(&page).unwrap();
        let diff = repo.commit().unwrap();

        let stored = repo.get_entity("/site1/ROOT/page1").unwrap();
        assert!(stored.ptr_eq(&page));
        {
            let e = stored.read();
            assert!(e.uuid.is_some());
            assert_eq!(e.created, Some(diff.committed_at));
            assert_eq!(e.created, e.modified);
        }
        assert_eq!(diff.saved_entities.len(), 1);
        assert_eq!(diff.saved_entities[0].uuid, page.uuid());
        assert!(storage.is_object("/site1/ROOT/page1/Entity.object").unwrap());
        assert!(leftovers(&storage).is_empty());

        repo.delete_entity(&page).unwrap();
        let diff = repo.commit().unwrap();
        assert_eq!(diff.removed_entities.len(), 1);
        assert!(repo.get_entity("/site1/ROOT/page1").unwrap_err().is_not_found());
        assert!(!storage.contains("/site1/ROOT/page1").unwrap());
        assert!(leftovers(&storage).is_empty());
        assert!(!repo.has_pending_changes());
    }

    #[test]
    fn created_survives_later_saves() {
        let (_storage, mut repo) = memory_repo();
        repo.set_actor(Some("alice".into()));
        let page = document("/p", "Page");
        commit_all(&mut repo, &[&page]);
        let created = page.read().created;

        repo.set_actor(Some("bob".into()));
        page.write().set_property("rev", 2i64);
        commit_all(&mut repo, &[&page]);

        let e = page.read();
        assert_eq!(e.created, created);
        assert!(e.modified >= created);
        assert_eq!(e.created_by.as_deref(), Some("alice"));
        assert_eq!(e.modified_by.as_deref(), Some("bob"));
    }

    #[test]
    fn commit_works_on_a_clone() {
        let (storage, mut repo) = memory_repo();
        let page = document("/p", "Page");
        repo.save_entity(&page).unwrap();
        // Edits after staging are still picked up at commit.
        page.write().set_property("late", "yes");
        repo.commit().unwrap();
        let reader = Repository::new(Arc::new(storage.clone())).unwrap();
        let loaded = reader.get_entity("/p").unwrap();
        assert_eq!(loaded.read().property_str("late").unwrap(), Some("yes"));
    }

    #[test]
    fn begin_is_unsupported() {
        let (_storage, mut repo) = memory_repo();
        assert!(matches!(repo.begin(), Err(RepoError::BeginUnsupported)));
    }

    #[test]
    fn empty_commit() {
        let (storage, mut repo) = memory_repo();
        assert!(repo.commit().unwrap().is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn delete_and_recreate_in_one_commit() {
        let (storage, mut repo) = memory_repo();
        let old = document("/p", "Old");
        let child = document("/p/c", "Child");
        commit_all(&mut repo, &[&old, &child]);

        repo.delete_entity(&old).unwrap();
        let new = document("/p", "New");
        repo.save_entity(&new).unwrap();
        let diff = repo.commit().unwrap();

        assert_eq!(diff.removed_entities.len(), 2);
        assert!(repo.get_entity("/p").unwrap().ptr_eq(&new));
        assert!(repo.get_entity("/p/c").unwrap_err().is_not_found());
        assert_ne!(new.uuid(), old.uuid());
        assert!(leftovers(&storage).is_empty());
    }

    #[test]
    fn deleting_missing_path_is_a_noop() {
        let (_storage, mut repo) = memory_repo();
        repo.delete_entity_by_path("/never").unwrap();
        let diff = repo.commit().unwrap();
        assert_eq!(diff.deleted_entity_paths, vec!["/never"]);
        assert!(diff.removed_entities.is_empty());
    }

    #[test]
    fn explicit_rollback_discards_staging() {
        let (storage, mut repo) = memory_repo();
        repo.save_entity(&document("/p", "Page")).unwrap();
        assert!(repo.has_pending_changes());
        repo.rollback();
        assert!(!repo.has_pending_changes());
        repo.commit().unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn hooks_see_the_diff() {
        let hook = Arc::new(RecordingHook::default());
        let mut repo = Repository::builder(Arc::new(InMemoryStorage::new()))
            .commit_hook(hook.clone())
            .build()
            .unwrap();
        let page = document("/p", "Page");
        commit_all(&mut repo, &[&page, &document("/q", "Q")]);
        repo.delete_entity(&page).unwrap();
        repo.commit().unwrap();
        assert_eq!(*hook.seen.lock().unwrap(), vec![(2, 0), (0, 1)]);
    }

    #[test]
    fn serialize_hooks_touch_copies_only() {
        let storage = InMemoryStorage::new();
        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .serialize_hook(Arc::new(StampHook))
            .build()
            .unwrap();
        let page = document("/p", "Page");
        commit_all(&mut repo, &[&page]);
        assert!(!page.read().has_property("serialized"));

        let reader = Repository::builder(Arc::new(storage.clone()))
            .serialize_hook(Arc::new(StampHook))
            .build()
            .unwrap();
        let loaded = reader.get_entity("/p").unwrap();
        let e = loaded.read();
        assert_eq!(e.property_bool("serialized").unwrap(), Some(true));
        assert_eq!(e.property_bool("loaded").unwrap(), Some(true));
    }

    #[test]
    fn bincode_objects_roundtrip() {
        let storage = InMemoryStorage::new();
        let config = RepositoryConfig {
            serializer: SerializerKind::Bincode,
            ..Default::default()
        };
        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .config(config.clone())
            .build()
            .unwrap();
        let mut site = Site::new("Main");
        site.hosts = vec!["example.org".into()];
        let handle = EntityHandle::new(
            Entity::new(EntityKind::Site(site))
                .with_path("/main")
                .with_property("tags", vec!["a", "b"])
                .with_property("ratio", PropertyValue::Float(0.5)),
        );
        commit_all(&mut repo, &[&handle]);

        let reader = Repository::builder(Arc::new(storage.clone()))
            .config(config)
            .build()
            .unwrap();
        let loaded = reader.get_entity("/main").unwrap().snapshot();
        assert_eq!(loaded, handle.snapshot());
    }

    #[test]
    fn commits_over_the_filesystem() {
        let dir = tempfile::TempDir::new().unwrap();
        let fs = Arc::new(cairn_store::FsStorage::open(dir.path()).unwrap());
        let mut repo = Repository::new(fs.clone()).unwrap();
        let page = document("/site1/ROOT/page1", "Page 1");
        repo.save_entity(&page).unwrap();
        repo.save_resource(&page, "logo.png", &b"png"[..]).unwrap();
        repo.commit().unwrap();
        assert!(dir.path().join("site1/ROOT/page1/Entity.object").is_file());
        assert!(!dir.path().join("_tmp").exists());

        page.write().set_property("rev", 2i64);
        repo.save_entity(&page).unwrap();
        repo.commit().unwrap();
        let names = fs.scan("/site1/ROOT/page1").unwrap();
        assert_eq!(names, vec!["Entity.object", "logo.png"]);

        let reader = Repository::new(fs.clone()).unwrap();
        let loaded = reader.get_entity("/site1/ROOT/page1").unwrap();
        assert_eq!(loaded.read().property_i64("rev").unwrap(), Some(2));

        repo.delete_entity(&page).unwrap();
        repo.commit().unwrap();
        assert!(!dir.path().join("site1/ROOT/page1").exists());
        assert!(!dir.path().join("_tmp").exists());
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    #[test]
    fn resource_lifecycle() {
        let (storage, mut repo) = memory_repo();
        let root = document("/site1/ROOT", "Home");
        repo.save_entity(&root).unwrap();
        repo.save_resource(&root, "logo.png", vec![0x89, b'P', b'N', b'G'])
            .unwrap();
        let diff = repo.commit().unwrap();
        assert_eq!(diff.saved_resources[0].owner, "/site1/ROOT");
        assert_eq!(diff.saved_resources[0].size, 4);

        assert_eq!(repo.get_resource(&root, "logo.png").unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert!(repo.has_resource(&root, "logo.png").unwrap());
        assert!(repo.get_resource_mtime(&root, "logo.png").unwrap().is_some());
        assert_eq!(repo.list_resources(&root).unwrap(), vec!["logo.png"]);

        repo.delete_resource(&root, "logo.png").unwrap();
        repo.commit().unwrap();
        assert!(matches!(
            repo.get_resource(&root, "logo.png"),
            Err(RepoError::ResourceNotFound(_))
        ));
        assert!(!repo.has_resource(&root, "logo.png").unwrap());
        assert!(repo.get_resource_mtime(&root, "logo.png").unwrap().is_none());
        assert!(leftovers(&storage).is_empty());
    }

    #[test]
    fn streamed_resource() {
        let storage = InMemoryStorage::new();
        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .config(RepositoryConfig {
                stream_chunk_size: 1000,
                ..Default::default()
            })
            .build()
            .unwrap();
        let root = document("/r", "R");
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        repo.save_entity(&root).unwrap();
        repo.write_resource(&root, "blob.bin", Cursor::new(payload.clone()))
            .unwrap();
        let diff = repo.commit().unwrap();
        assert_eq!(diff.saved_resources[0].source, ResourceSource::Stream);
        assert_eq!(diff.saved_resources[0].size, 50_000);

        let mut back = Vec::new();
        repo.read_resource(&root, "blob.bin")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back, payload);
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[test]
    fn publish_failure_restores_deletes() {
        let (storage, faulty, mut repo) = faulty_repo();
        let a = document("/a", "A");
        commit_all(&mut repo, &[&a]);
        let before = storage.get("/a/Entity.object").unwrap();

        faulty.fail_move_to("/b/Entity.object");
        repo.delete_entity(&a).unwrap();
        repo.save_entity(&document("/b", "B")).unwrap();
        assert!(repo.commit().is_err());

        assert_eq!(storage.get("/a/Entity.object").unwrap(), before);
        assert!(!storage.contains("/b").unwrap());
        assert!(leftovers(&storage).is_empty());
        assert!(!repo.has_pending_changes());
        assert_eq!(
            repo.get_entity_by_uuid(&a.uuid().unwrap()).unwrap().path().as_deref(),
            Some("/a")
        );
    }

    #[test]
    fn failed_publish_keeps_previous_version() {
        let (storage, faulty, mut repo) = faulty_repo();
        let a = document("/a", "A");
        commit_all(&mut repo, &[&a]);
        let before = storage.get("/a/Entity.object").unwrap();

        faulty.fail_move_to("/a/Entity.object");
        a.write().set_property("draft", true);
        repo.save_entity(&a).unwrap();
        assert!(repo.commit().is_err());
        assert_eq!(storage.get("/a/Entity.object").unwrap(), before);
        assert!(leftovers(&storage).is_empty());
    }

    #[test]
    fn partial_publish_is_reverted() {
        let (storage, faulty, mut repo) = faulty_repo();
        let a = document("/a", "A");
        commit_all(&mut repo, &[&a]);
        let before = storage.get("/a/Entity.object").unwrap();

        faulty.fail_move_to("/c/Entity.object");
        a.write().set_property("edited", true);
        repo.save_entity(&a).unwrap();
        repo.save_entity(&document("/b", "B")).unwrap();
        repo.save_entity(&document("/c", "C")).unwrap();
        assert!(repo.commit().is_err());

        assert_eq!(storage.get("/a/Entity.object").unwrap(), before);
        assert!(!storage.contains("/b").unwrap());
        assert!(!storage.contains("/c").unwrap());
        assert!(leftovers(&storage).is_empty());
    }

    #[test]
    fn failed_temp_write_leaves_storage_untouched() {
        let (storage, faulty, mut repo) = faulty_repo();
        let a = document("/a", "A");
        commit_all(&mut repo, &[&a]);
        let snapshot = storage.all_paths();

        faulty.fail_set_with_prefix("/a/Entity.object.");
        repo.save_entity(&a).unwrap();
        repo.save_entity(&document("/b", "B")).unwrap();
        let err = repo.commit().unwrap_err();
        assert!(matches!(err, RepoError::Storage(_)));
        assert_eq!(storage.all_paths(), snapshot);
    }

    #[test]
    fn hook_failure_rolls_back() {
        let storage = InMemoryStorage::new();
        let mut plain = Repository::new(Arc::new(storage.clone())).unwrap();
        let a = document("/a", "A");
        commit_all(&mut plain, &[&a]);

        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .commit_hook(Arc::new(FailingHook))
            .build()
            .unwrap();
        repo.delete_entity_by_path("/a").unwrap();
        let err = repo.commit().unwrap_err();
        assert!(matches!(err, RepoError::Hook { ref hook, .. } if hook == "failing"));
        assert!(storage.is_object("/a/Entity.object").unwrap());
        assert!(leftovers(&storage).is_empty());
        assert_eq!(repo.get_entity("/a").unwrap().uuid(), a.uuid());
    }

    fn title_of(handle: &EntityHandle) -> Option<String> {
        handle.read().title().map(str::to_string)
    }

    #[test]
    fn hook_failure_restores_replaced_entity() {
        let storage = InMemoryStorage::new();
        let cache = Arc::new(InMemoryCache::new());
        let mut plain = Repository::new(Arc::new(storage.clone())).unwrap();
        let old = document("/p", "Old");
        let child = document("/p/c", "Child");
        commit_all(&mut plain, &[&old, &child]);

        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .cache(cache.clone())
            .commit_hook(Arc::new(FailingHook))
            .build()
            .unwrap();
        repo.delete_entity_by_path("/p").unwrap();
        let replacement = document("/p", "New");
        repo.save_entity(&replacement).unwrap();
        assert!(repo.commit().is_err());

        assert_eq!(title_of(&repo.get_entity("/p").unwrap()).as_deref(), Some("Old"));
        assert!(repo.has_entity("/p/c").unwrap());
        assert!(leftovers(&storage).is_empty());

        let fresh = Repository::builder(Arc::new(storage.clone()))
            .cache(cache)
            .build()
            .unwrap();
        assert_eq!(title_of(&fresh.get_entity("/p").unwrap()).as_deref(), Some("Old"));

        let lost = replacement.uuid().unwrap();
        assert!(repo.get_entity_by_uuid(&lost).unwrap_err().is_not_found());
        let kept = old.uuid().unwrap();
        assert_eq!(repo.get_entity_by_uuid(&kept).unwrap().path().as_deref(), Some("/p"));
    }

    #[test]
    fn hook_failure_forgets_saves_inside_restored_subtree() {
        let storage = InMemoryStorage::new();
        let cache = Arc::new(InMemoryCache::new());
        let mut plain = Repository::new(Arc::new(storage.clone())).unwrap();
        let a = document("/a", "A");
        commit_all(&mut plain, &[&a]);

        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .cache(cache.clone())
            .commit_hook(Arc::new(FailingHook))
            .build()
            .unwrap();
        repo.delete_entity_by_path("/a").unwrap();
        let child = document("/a/new", "NewChild");
        repo.save_entity(&child).unwrap();
        assert!(repo.commit().is_err());

        assert!(!storage.is_object("/a/new/Entity.object").unwrap());
        assert!(!repo.watcher().contains("/a/new"));
        assert!(repo.get_entity("/a/new").unwrap_err().is_not_found());
        assert!(!repo.has_entity("/a/new").unwrap());
        assert_eq!(repo.get_entity("/a").unwrap().uuid(), a.uuid());

        let fresh = Repository::builder(Arc::new(storage.clone()))
            .cache(cache)
            .build()
            .unwrap();
        assert!(!fresh.has_entity("/a/new").unwrap());
        let lost = child.uuid().unwrap();
        assert!(repo.get_entity_by_uuid(&lost).unwrap_err().is_not_found());
    }
}
