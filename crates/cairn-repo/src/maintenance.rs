//! Whole-tree audits and rebuilds.

use std::collections::BTreeMap;

use cairn_index::{IndexDocument, Indexer};
use cairn_types::{Entity, Uuid};
use tracing::{info, warn};

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;

/// Outcome of [`Repository::find_duplicate_uuids`].
#[derive(Debug, Default)]
pub struct UuidAudit {
    /// UUIDs held by more than one entity, with their paths.
    pub duplicates: BTreeMap<Uuid, Vec<String>>,
    /// Entities stored without a UUID.
    pub missing: Vec<String>,
    /// Objects that could not be read.
    pub unreadable: Vec<(String, RepoError)>,
    pub scanned: usize,
}

impl UuidAudit {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.missing.is_empty() && self.unreadable.is_empty()
    }
}

/// Outcome of [`Repository::reindex`].
#[derive(Debug, Default)]
pub struct ReindexReport {
    pub indexed: usize,
    /// Paths that could not be turned into documents, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl Repository {
    /// The entity at `root` (if any) plus every readable descendant, and the
    /// read failures.
    fn audit_walk(&self, root: &str) -> RepoResult<(Vec<Entity>, Vec<(String, RepoError)>)> {
        let root = self.paths.sanitize(root);
        let mut entities = Vec::new();
        let mut errors = Vec::new();
        match self.load_entity(&root) {
            Ok(Some((entity, _))) => entities.push(entity),
            Ok(None) => {}
            Err(e) => errors.push((root.clone(), e)),
        }
        let scan = self.get_descendants_from_storage(&root, true)?;
        entities.extend(scan.entities);
        errors.extend(scan.errors);
        Ok((entities, errors))
    }

    /// Report UUIDs shared by several entities below `root`.
    pub fn find_duplicate_uuids(&self, root: &str) -> RepoResult<UuidAudit> {
        let (entities, unreadable) = self.audit_walk(root)?;
        let mut audit = UuidAudit {
            scanned: entities.len(),
            unreadable,
            ..Default::default()
        };
        let mut seen: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
        for entity in &entities {
            let path = entity.path().unwrap_or_default().to_string();
            match entity.uuid {
                Some(uuid) => seen.entry(uuid).or_default().push(path),
                None => audit.missing.push(path),
            }
        }
        audit.duplicates = seen.into_iter().filter(|(_, paths)| paths.len() > 1).collect();
        if !audit.is_clean() {
            warn!(
                duplicates = audit.duplicates.len(),
                missing = audit.missing.len(),
                unreadable = audit.unreadable.len(),
                "uuid audit found problems"
            );
        }
        Ok(audit)
    }

    /// Re-map every UUID below `root` from storage. Returns the number of
    /// mapped entities.
    pub fn rebuild_uuid_index(&self, root: &str) -> RepoResult<usize> {
        let (entities, errors) = self.audit_walk(root)?;
        for (path, e) in &errors {
            warn!(path = %path, error = %e, "skipping unreadable entity");
        }
        let mut mapped = 0;
        for entity in &entities {
            if let (Some(uuid), Some(path)) = (entity.uuid, entity.path()) {
                self.uuids.set(uuid, path)?;
                mapped += 1;
            }
        }
        info!(root, mapped, "rebuilt uuid index");
        Ok(mapped)
    }

    /// Replace the index contents below `root` with what storage holds.
    pub fn reindex(&self, root: &str, indexer: &dyn Indexer) -> RepoResult<ReindexReport> {
        let (entities, errors) = self.audit_walk(root)?;
        let mut report = ReindexReport::default();
        for (path, e) in errors {
            report.skipped.push((path, e.to_string()));
        }

        indexer.begin()?;
        let result = (|| -> RepoResult<()> {
            indexer.delete_subtree(&self.paths.sanitize(root))?;
            for entity in &entities {
                match IndexDocument::from_entity(entity) {
                    Ok(doc) => {
                        indexer.add_document(doc)?;
                        report.indexed += 1;
                    }
                    Err(e) => report
                        .skipped
                        .push((entity.path().unwrap_or_default().to_string(), e.to_string())),
                }
            }
            indexer.commit()?;
            Ok(())
        })();
        if let Err(e) = result {
            if let Err(rb) = indexer.rollback() {
                warn!(error = %rb, "index rollback failed");
            }
            return Err(e);
        }
        info!(root, indexed = report.indexed, skipped = report.skipped.len(), "reindexed");
        Ok(report)
    }
}
