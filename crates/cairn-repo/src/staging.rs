use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use bytes::Bytes;
use cairn_types::EntityHandle;

/// Resource bytes staged in memory.
#[derive(Clone, Debug)]
pub(crate) struct StagedData {
    pub owner: String,
    pub data: Bytes,
}

/// Resource content staged as a stream, consumed at commit.
pub(crate) struct StagedStream {
    pub owner: String,
    pub reader: Box<dyn Read + Send>,
}

impl fmt::Debug for StagedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedStream")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Buffers of the implicit transaction.
#[derive(Debug, Default)]
pub(crate) struct Staging {
    pub save_entities: BTreeMap<String, EntityHandle>,
    pub save_data: BTreeMap<String, StagedData>,
    pub save_streams: BTreeMap<String, StagedStream>,
    pub delete_entity_paths: Vec<String>,
    pub delete_paths: Vec<String>,
    /// Final path -> temporary path, for objects written during commit.
    pub tmp_files: BTreeMap<String, String>,
    /// Original path -> quarantine path, for deletes in flight.
    pub tmp_del_files: BTreeMap<String, String>,
    /// Final path -> copy of the object it replaced, while publishing.
    pub tmp_backups: BTreeMap<String, String>,
}

impl Staging {
    pub fn stage_entity_delete(&mut self, path: String) {
        if !self.delete_entity_paths.contains(&path) {
            self.delete_entity_paths.push(path);
        }
    }

    pub fn stage_delete(&mut self, path: String) {
        if !self.delete_paths.contains(&path) {
            self.delete_paths.push(path);
        }
    }

    /// Stage resource bytes; replaces any stream staged for the same path.
    pub fn stage_data(&mut self, path: String, data: StagedData) {
        self.save_streams.remove(&path);
        self.save_data.insert(path, data);
    }

    pub fn stage_stream(&mut self, path: String, stream: StagedStream) {
        self.save_data.remove(&path);
        self.save_streams.insert(path, stream);
    }

    pub fn has_changes(&self) -> bool {
        !(self.save_entities.is_empty()
            && self.save_data.is_empty()
            && self.save_streams.is_empty()
            && self.delete_entity_paths.is_empty()
            && self.delete_paths.is_empty())
    }

    pub fn summary(&self) -> PendingSummary {
        PendingSummary {
            entities_to_save: self.save_entities.keys().cloned().collect(),
            resources_to_save: self
                .save_data
                .keys()
                .chain(self.save_streams.keys())
                .cloned()
                .collect(),
            entities_to_delete: self.delete_entity_paths.clone(),
            resources_to_delete: self.delete_paths.clone(),
        }
    }

    /// Drop every buffer. Temp file bookkeeping is cleared too; callers
    /// purge the files first.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// What the next commit would do, by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingSummary {
    pub entities_to_save: Vec<String>,
    pub resources_to_save: Vec<String>,
    pub entities_to_delete: Vec<String>,
    pub resources_to_delete: Vec<String>,
}

impl PendingSummary {
    pub fn is_empty(&self) -> bool {
        self.entities_to_save.is_empty()
            && self.resources_to_save.is_empty()
            && self.entities_to_delete.is_empty()
            && self.resources_to_delete.is_empty()
    }
}
