use std::sync::Arc;

use cairn_index::{IndexDocument, Indexer};
use tracing::{debug, warn};

use crate::error::{RepoError, RepoResult};
use crate::hooks::{CommitDiff, CommitHook};

/// Commit hook mirroring committed entities into an [`Indexer`].
///
/// Deleted paths drop their whole subtree from the index; saved entities
/// are (re)added. All changes of one commit land in one index transaction,
/// committed after every other hook has succeeded.
pub struct IndexSynchronizer {
    indexer: Arc<dyn Indexer>,
}

impl IndexSynchronizer {
    pub fn new(indexer: Arc<dyn Indexer>) -> Self {
        Self { indexer }
    }

    fn apply(&self, diff: &CommitDiff) -> RepoResult<()> {
        for path in &diff.deleted_entity_paths {
            self.indexer.delete_subtree(path)?;
        }
        for entity in &diff.saved_entities {
            self.indexer.add_document(IndexDocument::from_entity(entity)?)?;
        }
        self.indexer.commit()?;
        Ok(())
    }
}

impl CommitHook for IndexSynchronizer {
    fn name(&self) -> &str {
        "index-synchronizer"
    }

    fn runs_last(&self) -> bool {
        true
    }

    fn on_commit(&self, diff: &CommitDiff) -> RepoResult<()> {
        self.indexer.begin()?;
        if let Err(e) = self.apply(diff) {
            if let Err(rb) = self.indexer.rollback() {
                warn!(error = %rb, "index rollback failed");
            }
            return Err(RepoError::Hook {
                hook: self.name().to_string(),
                reason: e.to_string(),
            });
        }
        debug!(
            added = diff.saved_entities.len(),
            removed = diff.deleted_entity_paths.len(),
            "index synchronized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use crate::testing::{commit_all, document};
    use cairn_index::InMemoryIndexer;
    use cairn_store::{InMemoryStorage, Storage};

    fn indexed_repo() -> (InMemoryStorage, Arc<InMemoryIndexer>, Repository) {
        let storage = InMemoryStorage::new();
        let indexer = Arc::new(InMemoryIndexer::new());
        let repo = Repository::builder(Arc::new(storage.clone()))
            .commit_hook(Arc::new(IndexSynchronizer::new(indexer.clone())))
            .build()
            .unwrap();
        (storage, indexer, repo)
    }

    #[test]
    fn commits_flow_into_the_index() {
        let (_storage, indexer, mut repo) = indexed_repo();
        let page = document("/s/alpha", "Alpha Page");
        commit_all(&mut repo, &[&page, &document("/s/alpha/child", "Nested")]);
        assert_eq!(indexer.search("alpha page")[0].path, "/s/alpha");
        assert_eq!(indexer.len(), 2);

        repo.delete_entity(&page).unwrap();
        repo.commit().unwrap();
        assert!(indexer.is_empty());
    }

    #[test]
    fn index_failure_aborts_commit() {
        let (storage, indexer, mut repo) = indexed_repo();
        let page = document("/p", "Page");
        commit_all(&mut repo, &[&page]);

        indexer.begin().unwrap();
        repo.delete_entity(&page).unwrap();
        assert!(matches!(repo.commit(), Err(RepoError::Index(_))));
        assert!(storage.is_object("/p/Entity.object").unwrap());
        assert_eq!(indexer.paths(), vec!["/p"]);
    }

    struct Refuse;

    impl CommitHook for Refuse {
        fn name(&self) -> &str {
            "refuse"
        }

        fn on_commit(&self, _diff: &CommitDiff) -> RepoResult<()> {
            Err(RepoError::Hook {
                hook: "refuse".into(),
                reason: "no".into(),
            })
        }
    }

    #[test]
    fn index_is_untouched_when_a_later_hook_fails() {
        let storage = InMemoryStorage::new();
        let indexer = Arc::new(InMemoryIndexer::new());
        let mut setup = Repository::builder(Arc::new(storage.clone()))
            .commit_hook(Arc::new(IndexSynchronizer::new(indexer.clone())))
            .build()
            .unwrap();
        let page = document("/p", "Page");
        commit_all(&mut setup, &[&page]);

        let mut repo = Repository::builder(Arc::new(storage.clone()))
            .commit_hook(Arc::new(IndexSynchronizer::new(indexer.clone())))
            .commit_hook(Arc::new(Refuse))
            .build()
            .unwrap();
        repo.delete_entity_by_path("/p").unwrap();
        repo.save_entity(&document("/q", "Other")).unwrap();
        let err = repo.commit().unwrap_err();
        assert!(matches!(err, RepoError::Hook { ref hook, .. } if hook == "refuse"));
        assert!(storage.is_object("/p/Entity.object").unwrap());
        assert_eq!(indexer.paths(), vec!["/p"]);
    }
}
