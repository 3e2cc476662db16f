use crate::document::IndexDocument;
use crate::error::IndexResult;

/// A transactional document index.
///
/// Mutations are only legal between `begin` and `commit`/`rollback`.
/// Documents are keyed by entity path; adding a document for a path that is
/// already indexed replaces it.
pub trait Indexer: Send + Sync {
    fn begin(&self) -> IndexResult<()>;

    fn add_document(&self, document: IndexDocument) -> IndexResult<()>;

    /// Remove the document indexed at `path`, if any.
    fn delete_document(&self, path: &str) -> IndexResult<()>;

    /// Remove the document at `path` and every document below it.
    fn delete_subtree(&self, path: &str) -> IndexResult<()>;

    /// Make all staged changes visible.
    fn commit(&self) -> IndexResult<()>;

    /// Discard all staged changes.
    fn rollback(&self) -> IndexResult<()>;
}
