use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use cairn_cache::{Cache, CacheItem, CachedEntity, Watcher};
use cairn_path::PathBuilder;
use cairn_store::{Mtime, StoreError, Storage};
use cairn_types::{Entity, EntityHandle, KindTag, Uuid};
use tracing::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::convertor::{InMemoryUuidConvertor, UuidConvertor};
use crate::error::{RepoError, RepoResult};
use crate::hooks::{CommitHook, SerializeHook};
use crate::serializer::{serializer_for, Serializer};
use crate::staging::{PendingSummary, StagedData, StagedStream, Staging};

/// Longest cache key the repository produces: `entity-` plus a hex BLAKE3
/// digest.
pub const CACHE_KEY_LEN: usize = 7 + 64;

/// Cache key for the entity at `path`.
pub fn cache_key(path: &str) -> String {
    format!("entity-{}", hex::encode(blake3::hash(path.as_bytes()).as_bytes()))
}

/// Options for [`Repository::get_children`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only return entities this tag admits.
    pub kind: Option<KindTag>,
    /// Descend into children of children.
    pub deep: bool,
    /// Skip children that fail to load instead of failing the listing.
    pub ignore_errors: bool,
}

impl ListOptions {
    pub fn kind(mut self, kind: KindTag) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }
}

/// Result of a raw storage walk.
#[derive(Debug, Default)]
pub struct DescendantScan {
    /// Readable entities in depth-first, name-sorted order.
    pub entities: Vec<Entity>,
    /// Paths whose object failed to load, with the reason.
    pub errors: Vec<(String, RepoError)>,
}

/// Builds a [`Repository`], negotiating collaborator capabilities.
pub struct RepositoryBuilder {
    storage: Arc<dyn Storage>,
    cache: Option<Arc<dyn Cache>>,
    serializer: Option<Arc<dyn Serializer>>,
    uuids: Option<Arc<dyn UuidConvertor>>,
    commit_hooks: Vec<Arc<dyn CommitHook>>,
    serialize_hooks: Vec<Arc<dyn SerializeHook>>,
    config: RepositoryConfig,
}

impl RepositoryBuilder {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            cache: None,
            serializer: None,
            uuids: None,
            commit_hooks: Vec::new(),
            serialize_hooks: Vec::new(),
            config: RepositoryConfig::default(),
        }
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override the serializer selected by the configuration.
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn uuid_convertor(mut self, uuids: Arc<dyn UuidConvertor>) -> Self {
        self.uuids = Some(uuids);
        self
    }

    pub fn commit_hook(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.commit_hooks.push(hook);
        self
    }

    pub fn serialize_hook(mut self, hook: Arc<dyn SerializeHook>) -> Self {
        self.serialize_hooks.push(hook);
        self
    }

    pub fn config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RepoResult<Repository> {
        let paths = PathBuilder::new();
        self.config.validate(&paths)?;

        if let Some(cache) = &self.cache {
            let caps = cache.capabilities();
            if !caps.object_values {
                return Err(RepoError::UnsupportedCache(
                    "cache cannot store composite entity values".into(),
                ));
            }
            if !caps.accepts_key_length(CACHE_KEY_LEN) {
                return Err(RepoError::UnsupportedCache(format!(
                    "cache keys are limited to {:?} bytes, {CACHE_KEY_LEN} required",
                    caps.max_key_length
                )));
            }
        }

        let serializer = self
            .serializer
            .unwrap_or_else(|| serializer_for(self.config.serializer));
        let uuids = self
            .uuids
            .unwrap_or_else(|| Arc::new(InMemoryUuidConvertor::new()));

        let mut commit_hooks = self.commit_hooks;
        commit_hooks.sort_by_key(|hook| hook.runs_last());

        debug!(
            serializer = serializer.name(),
            cache = self.cache.is_some(),
            hooks = commit_hooks.len(),
            "repository built"
        );

        Ok(Repository {
            actor: self.config.default_actor.clone(),
            storage: self.storage,
            cache: self.cache,
            watcher: Watcher::new(),
            serializer,
            uuids,
            commit_hooks,
            serialize_hooks: self.serialize_hooks,
            paths,
            config: self.config,
            staged: Staging::default(),
        })
    }
}

/// A transactional view over entity storage.
///
/// Reads consult the identity map, then the cache (validated against storage
/// mtimes), then storage. Saves and deletes are buffered until
/// [`commit`](Repository::commit); moves and copies apply immediately.
///
/// One instance serves one logical request. Nothing coordinates concurrent
/// instances over the same storage.
pub struct Repository {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) cache: Option<Arc<dyn Cache>>,
    pub(crate) watcher: Watcher,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) uuids: Arc<dyn UuidConvertor>,
    pub(crate) commit_hooks: Vec<Arc<dyn CommitHook>>,
    pub(crate) serialize_hooks: Vec<Arc<dyn SerializeHook>>,
    pub(crate) paths: PathBuilder,
    pub(crate) config: RepositoryConfig,
    pub(crate) actor: Option<String>,
    pub(crate) staged: Staging,
}

impl Repository {
    pub fn builder(storage: Arc<dyn Storage>) -> RepositoryBuilder {
        RepositoryBuilder::new(storage)
    }

    /// Repository with default configuration and no cache.
    pub fn new(storage: Arc<dyn Storage>) -> RepoResult<Self> {
        Self::builder(storage).build()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn path_builder(&self) -> &PathBuilder {
        &self.paths
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Actor stamped into entities by subsequent commits.
    pub fn set_actor(&mut self, actor: Option<String>) {
        self.actor = actor;
    }

    // ---- Read path ----

    /// Fetch the entity at `path`.
    ///
    /// The returned handle is the same instance for every call with the same
    /// path until the path is moved, deleted or evicted.
    pub fn get_entity(&self, path: &str) -> RepoResult<EntityHandle> {
        let path = self.paths.sanitize(path);
        if let Some(handle) = self.watcher.get(&path) {
            return Ok(handle);
        }
        if let Some(handle) = self.get_entity_from_cache(&path)? {
            return Ok(handle);
        }
        self.get_entity_from_storage(&path)?
            .ok_or(RepoError::EntityNotFound(path))
    }

    pub fn has_entity(&self, path: &str) -> RepoResult<bool> {
        match self.get_entity(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_entity_by_uuid(&self, uuid: &Uuid) -> RepoResult<EntityHandle> {
        let path = self
            .uuids
            .get_path(uuid)?
            .ok_or(RepoError::EntityNotFoundByUuid(*uuid))?;
        match self.get_entity(&path) {
            Err(e) if e.is_not_found() => Err(RepoError::EntityNotFoundByUuid(*uuid)),
            other => other,
        }
    }

    /// The nearest ancestor path holding an entity.
    pub fn get_parent(&self, entity: &EntityHandle) -> RepoResult<Option<EntityHandle>> {
        let path = entity.path().ok_or(RepoError::MissingPath)?;
        let mut current = self.paths.parent(&path);
        while let Some(candidate) = current {
            match self.get_entity(&candidate) {
                Ok(handle) => return Ok(Some(handle)),
                Err(e) if e.is_not_found() => current = self.paths.parent(&candidate),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn get_entity_from_cache(&self, path: &str) -> RepoResult<Option<EntityHandle>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let key = cache_key(path);
        let Some(item) = cache.get_item(&key)? else {
            return Ok(None);
        };
        let Some(cached) = item.into_entity() else {
            warn!(path, "unexpected cache value for entity key; evicting");
            cache.remove_item(&key)?;
            return Ok(None);
        };

        match self.get_storage_mtime(path)? {
            Some(stored) if stored <= cached.mtime => {
                let mut entity = cached.entity;
                entity.set_path(path);
                let handle = EntityHandle::new(entity);
                self.watcher.add(&handle);
                debug!(path, "cache hit");
                Ok(Some(handle))
            }
            _ => {
                debug!(path, cached_mtime = cached.mtime, "stale cache entry");
                cache.remove_item(&key)?;
                Ok(None)
            }
        }
    }

    fn get_entity_from_storage(&self, path: &str) -> RepoResult<Option<EntityHandle>> {
        let Some((entity, mtime)) = self.load_entity(path)? else {
            self.watcher.remove(path);
            self.evict_cache(path)?;
            return Ok(None);
        };
        let handle = EntityHandle::new(entity);
        self.watcher.add(&handle);
        if let Some(cache) = &self.cache {
            cache.set_item(
                &cache_key(path),
                CacheItem::Entity(CachedEntity {
                    entity: handle.snapshot(),
                    mtime,
                }),
            )?;
        }
        Ok(Some(handle))
    }

    /// Read and unserialize the object at `path` without touching the
    /// identity map or the cache.
    pub(crate) fn load_entity(&self, path: &str) -> RepoResult<Option<(Entity, Mtime)>> {
        let object_path = self.object_path(path);
        // mtime first: a write racing the read leaves the cached copy stale,
        // never falsely fresh.
        let mtime = self.storage.mtime(&object_path)?;
        let data = match self.storage.get(&object_path) {
            Ok(data) => data,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entity = self.unserialize(path, &data)?;
        Ok(Some((entity, mtime.unwrap_or_default())))
    }

    pub(crate) fn unserialize(&self, path: &str, data: &[u8]) -> RepoResult<Entity> {
        let mut entity =
            self.serializer
                .unserialize(data)
                .map_err(|e| RepoError::Unserialization {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
        entity.set_path(path);
        for hook in &self.serialize_hooks {
            hook.post_unserialize(&mut entity)?;
        }
        Ok(entity)
    }

    /// Storage mtime of the object of the entity at `path`.
    pub fn get_storage_mtime(&self, path: &str) -> RepoResult<Option<Mtime>> {
        Ok(self.storage.mtime(&self.object_path(path))?)
    }

    // ---- Listing ----

    /// Paths of the child nodes of `path`, excluding resources and the
    /// quarantine area.
    pub fn get_child_entity_paths(&self, path: &str) -> RepoResult<Vec<String>> {
        let path = self.paths.sanitize(path);
        let mut children = Vec::new();
        for name in self.storage.scan(&path)? {
            if name == self.config.object_filename {
                continue;
            }
            let child = self.paths.join(&path, &name);
            if child == self.config.temp_dir || self.storage.is_object(&child)? {
                continue;
            }
            children.push(child);
        }
        Ok(children)
    }

    /// Entities below `path`. Nodes without an entity object are skipped.
    pub fn get_children(&self, path: &str, options: &ListOptions) -> RepoResult<Vec<EntityHandle>> {
        let mut out = Vec::new();
        self.collect_children(&self.paths.sanitize(path), options, &mut out)?;
        Ok(out)
    }

    fn collect_children(
        &self,
        path: &str,
        options: &ListOptions,
        out: &mut Vec<EntityHandle>,
    ) -> RepoResult<()> {
        for child in self.get_child_entity_paths(path)? {
            match self.get_entity(&child) {
                Ok(handle) => {
                    let admitted = match options.kind {
                        Some(tag) => tag.admits(&handle.read().kind),
                        None => true,
                    };
                    if admitted {
                        out.push(handle);
                    }
                    if options.deep {
                        self.collect_children(&child, options, out)?;
                    }
                }
                Err(e) if e.is_not_found() => {
                    debug!(path = %child, "node without entity object");
                }
                Err(e) if options.ignore_errors => {
                    warn!(path = %child, error = %e, "skipping unreadable child");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Walk storage below `path`, loading every entity object directly.
    ///
    /// Bypasses the identity map and the cache. With `suppress_errors`,
    /// unreadable objects are collected in [`DescendantScan::errors`]
    /// instead of aborting the walk.
    pub fn get_descendants_from_storage(
        &self,
        path: &str,
        suppress_errors: bool,
    ) -> RepoResult<DescendantScan> {
        let mut scan = DescendantScan::default();
        self.walk_descendants(&self.paths.sanitize(path), suppress_errors, &mut scan)?;
        Ok(scan)
    }

    fn walk_descendants(
        &self,
        path: &str,
        suppress_errors: bool,
        scan: &mut DescendantScan,
    ) -> RepoResult<()> {
        for child in self.get_child_entity_paths(path)? {
            match self.load_entity(&child) {
                Ok(Some((entity, _))) => scan.entities.push(entity),
                Ok(None) => {}
                Err(e) if suppress_errors => scan.errors.push((child.clone(), e)),
                Err(e) => return Err(e),
            }
            self.walk_descendants(&child, suppress_errors, scan)?;
        }
        Ok(())
    }

    // ---- Staging ----

    /// Stage `entity` for saving under its current path.
    pub fn save_entity(&mut self, entity: &EntityHandle) -> RepoResult<()> {
        let path = entity.path().ok_or(RepoError::MissingPath)?;
        self.check_content_path(&path)?;
        debug!(path = %path, "staged entity save");
        self.staged.save_entities.insert(path, entity.clone());
        Ok(())
    }

    /// Stage resource bytes under `entity`.
    pub fn save_resource(
        &mut self,
        entity: &EntityHandle,
        name: &str,
        data: impl Into<Bytes>,
    ) -> RepoResult<()> {
        let (owner, path) = self.resource_path(entity, name)?;
        let data = data.into();
        debug!(path = %path, len = data.len(), "staged resource");
        self.staged.stage_data(path, StagedData { owner, data });
        Ok(())
    }

    /// Stage a resource whose content is streamed into storage at commit.
    pub fn write_resource(
        &mut self,
        entity: &EntityHandle,
        name: &str,
        reader: impl Read + Send + 'static,
    ) -> RepoResult<()> {
        let (owner, path) = self.resource_path(entity, name)?;
        debug!(path = %path, "staged resource stream");
        self.staged.stage_stream(
            path,
            StagedStream {
                owner,
                reader: Box::new(reader),
            },
        );
        Ok(())
    }

    pub fn delete_resource(&mut self, entity: &EntityHandle, name: &str) -> RepoResult<()> {
        let (_, path) = self.resource_path(entity, name)?;
        self.staged.stage_delete(path);
        Ok(())
    }

    /// Stage the removal of `entity` and everything below it.
    pub fn delete_entity(&mut self, entity: &EntityHandle) -> RepoResult<()> {
        let path = entity.path().ok_or(RepoError::MissingPath)?;
        self.delete_entity_by_path(&path)
    }

    pub fn delete_entity_by_path(&mut self, path: &str) -> RepoResult<()> {
        let path = self.paths.sanitize(path);
        self.check_content_path(&path)?;
        if path == self.paths.root() {
            return Err(RepoError::invalid_path(&path, "the root cannot be deleted"));
        }
        debug!(path = %path, "staged entity delete");
        self.staged.stage_entity_delete(path);
        Ok(())
    }

    pub fn has_pending_changes(&self) -> bool {
        self.staged.has_changes()
    }

    pub fn pending_summary(&self) -> PendingSummary {
        self.staged.summary()
    }

    // ---- Immediate structural operations ----

    /// Move `entity` and its subtree to `target`. Applies immediately.
    pub fn move_entity(&mut self, entity: &EntityHandle, target: &str) -> RepoResult<EntityHandle> {
        let source = entity.path().ok_or(RepoError::MissingPath)?;
        self.check_content_path(&source)?;
        self.check_content_path(target)?;
        if source == target {
            return self.get_entity(target);
        }
        if self.paths.is_descendant(target, &source) {
            return Err(RepoError::invalid_path(target, "cannot move an entity below itself"));
        }
        if self.storage.contains(target)? {
            return Err(RepoError::TargetExists(target.to_string()));
        }

        self.evict_subtree(&source)?;
        self.evict_subtree(target)?;
        if !self.storage.move_path(&source, target)? {
            return Err(RepoError::EntityNotFound(source));
        }

        for moved in self.subtree_entities(target)? {
            if let (Some(uuid), Some(path)) = (moved.uuid, moved.path()) {
                self.uuids.set(uuid, path)?;
            }
        }
        info!(from = %source, to = target, "moved entity");
        self.get_entity(target)
    }

    /// Copy `entity` and its subtree to `target`. Applies immediately.
    ///
    /// Every copied entity receives a fresh UUID.
    pub fn copy_entity(&mut self, entity: &EntityHandle, target: &str) -> RepoResult<EntityHandle> {
        let source = entity.path().ok_or(RepoError::MissingPath)?;
        self.check_content_path(&source)?;
        self.check_content_path(target)?;
        if source == target || self.paths.is_descendant(target, &source) {
            return Err(RepoError::invalid_path(target, "cannot copy an entity onto or below itself"));
        }
        if self.storage.contains(target)? {
            return Err(RepoError::TargetExists(target.to_string()));
        }

        self.evict_subtree(target)?;
        if !self.storage.copy(&source, target)? {
            return Err(RepoError::EntityNotFound(source));
        }

        let mut copied = 0usize;
        for mut clone in self.subtree_entities(target)? {
            let Some(path) = clone.path().map(str::to_string) else {
                continue;
            };
            let uuid = Uuid::now_v7();
            clone.uuid = Some(uuid);
            for hook in &self.serialize_hooks {
                hook.pre_serialize(&mut clone)?;
            }
            let data = self.serializer.serialize(&clone)?;
            self.storage.set(&self.object_path(&path), &data)?;
            self.uuids.set(uuid, &path)?;
            copied += 1;
        }
        info!(from = %source, to = target, entities = copied, "copied entity");
        self.get_entity(target)
    }

    // ---- Helpers ----

    pub(crate) fn object_path(&self, path: &str) -> String {
        self.paths.join(path, &self.config.object_filename)
    }

    fn resource_path(&self, entity: &EntityHandle, name: &str) -> RepoResult<(String, String)> {
        let owner = entity.path().ok_or(RepoError::MissingPath)?;
        self.check_content_path(&owner)?;
        self.paths.validate_name(name)?;
        if name == self.config.object_filename {
            return Err(RepoError::invalid_path(name, "reserved for the entity object"));
        }
        let path = self.paths.join(&owner, name);
        Ok((owner, path))
    }

    /// Canonical and outside the quarantine area.
    pub(crate) fn check_content_path(&self, path: &str) -> RepoResult<()> {
        self.paths
            .validate(path)
            .map_err(|e| RepoError::invalid_path(path, e.to_string()))?;
        let temp = &self.config.temp_dir;
        if path == temp || self.paths.is_descendant(path, temp) {
            return Err(RepoError::invalid_path(path, "reserved for in-flight deletes"));
        }
        Ok(())
    }

    /// The entity at `path` (if any) followed by all its descendants, read
    /// straight from storage. Unreadable objects are skipped.
    pub(crate) fn subtree_entities(&self, path: &str) -> RepoResult<Vec<Entity>> {
        let mut entities = Vec::new();
        match self.load_entity(path) {
            Ok(Some((entity, _))) => entities.push(entity),
            Ok(None) => {}
            Err(e) => warn!(path, error = %e, "unreadable entity in subtree"),
        }
        let scan = self.get_descendants_from_storage(path, true)?;
        for (p, e) in &scan.errors {
            warn!(path = %p, error = %e, "unreadable entity in subtree");
        }
        entities.extend(scan.entities);
        Ok(entities)
    }

    /// Drop `path` and every entity below it from the identity map and the
    /// cache. Storage must still hold the subtree.
    pub(crate) fn evict_subtree(&self, path: &str) -> RepoResult<()> {
        self.watcher.remove_subtree(path);
        if self.cache.is_some() {
            self.evict_cache(path)?;
            for child in self.subtree_node_paths(path)? {
                self.evict_cache(&child)?;
            }
        }
        Ok(())
    }

    fn subtree_node_paths(&self, path: &str) -> RepoResult<Vec<String>> {
        let mut out = Vec::new();
        let mut pending = vec![path.to_string()];
        while let Some(current) = pending.pop() {
            for child in self.get_child_entity_paths(&current)? {
                pending.push(child.clone());
                out.push(child);
            }
        }
        Ok(out)
    }

    pub(crate) fn evict_cache(&self, path: &str) -> RepoResult<()> {
        if let Some(cache) = &self.cache {
            cache.remove_item(&cache_key(path))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("serializer", &self.serializer.name())
            .field("cache", &self.cache.is_some())
            .field("watched", &self.watcher.len())
            .field("pending", &self.staged.has_changes())
            .finish_non_exhaustive()
    }
}
