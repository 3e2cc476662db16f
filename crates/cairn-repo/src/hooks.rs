//! Extension points around commits and (un)serialization.

use std::collections::BTreeMap;

use cairn_types::{Entity, Timestamp, Uuid};

use crate::error::RepoResult;

/// An entity removed by a commit, including descendants of a deleted path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovedEntity {
    pub path: String,
    pub uuid: Option<Uuid>,
}

/// Where the bytes of a committed resource came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceSource {
    Data,
    Stream,
}

/// A resource written by a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceChange {
    /// Storage path of the resource.
    pub path: String,
    /// Path of the entity owning the resource.
    pub owner: String,
    pub source: ResourceSource,
    /// Bytes written.
    pub size: u64,
}

/// Everything a commit changed, handed to every [`CommitHook`] once the
/// changes are published, and returned from `commit()`.
#[derive(Clone, Debug)]
pub struct CommitDiff {
    pub committed_at: Timestamp,
    pub actor: Option<String>,
    /// Committed copies, stamped and carrying their paths.
    pub saved_entities: Vec<Entity>,
    /// Paths staged for deletion.
    pub deleted_entity_paths: Vec<String>,
    /// Every entity that disappeared with those paths.
    pub removed_entities: Vec<RemovedEntity>,
    pub saved_resources: Vec<ResourceChange>,
    pub deleted_resource_paths: Vec<String>,
    /// Final path to temporary path of every written object.
    pub temp_files: BTreeMap<String, String>,
    /// Original path to quarantine path of every delete.
    pub quarantined: BTreeMap<String, String>,
}

impl CommitDiff {
    pub(crate) fn new(committed_at: Timestamp, actor: Option<String>) -> Self {
        Self {
            committed_at,
            actor,
            saved_entities: Vec::new(),
            deleted_entity_paths: Vec::new(),
            removed_entities: Vec::new(),
            saved_resources: Vec::new(),
            deleted_resource_paths: Vec::new(),
            temp_files: BTreeMap::new(),
            quarantined: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.saved_entities.is_empty()
            && self.deleted_entity_paths.is_empty()
            && self.saved_resources.is_empty()
            && self.deleted_resource_paths.is_empty()
    }
}

/// Called once per commit after storage, the identity map and the cache are
/// up to date. An error aborts the commit and rolls it back.
pub trait CommitHook: Send + Sync {
    fn name(&self) -> &str;

    fn on_commit(&self, diff: &CommitDiff) -> RepoResult<()>;

    /// Hooks returning `true` run after every other hook, in registration
    /// order. Hooks that commit to an external store whose changes cannot
    /// be taken back should return `true`.
    fn runs_last(&self) -> bool {
        false
    }
}

/// Adjusts entities around (un)serialization.
///
/// `pre_serialize` sees the commit copy, never the caller's instance.
pub trait SerializeHook: Send + Sync {
    fn pre_serialize(&self, _entity: &mut Entity) -> RepoResult<()> {
        Ok(())
    }

    fn post_unserialize(&self, _entity: &mut Entity) -> RepoResult<()> {
        Ok(())
    }
}
