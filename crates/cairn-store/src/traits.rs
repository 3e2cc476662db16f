use std::io::{Read, Write};

use crate::error::StoreResult;

/// Modification time in microseconds since the UNIX epoch.
pub type Mtime = i64;

/// Hierarchical, path-keyed byte store.
///
/// All implementations must satisfy these invariants:
/// - `set` and `move_path` are atomic for a single path: readers observe
///   either the old or the new content, never a mix.
/// - Moving or removing a node moves or removes its whole subtree.
/// - Nothing is atomic across paths. Multi-path consistency is the
///   caller's business.
pub trait Storage: Send + Sync {
    /// Read the object at `path`.
    ///
    /// Returns `Err(StoreError::NotFound)` if no object exists there.
    fn get(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Write `data` to `path`, creating intermediate nodes.
    fn set(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Move `from` (object or subtree) to `to`, replacing the destination.
    ///
    /// Returns `false` if nothing existed at `from`.
    fn move_path(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Copy `from` (object or subtree) to `to`, replacing the destination.
    ///
    /// Returns `false` if nothing existed at `from`.
    fn copy(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Remove the object or subtree at `path`. Returns `true` if it existed.
    fn remove(&self, path: &str) -> StoreResult<bool>;

    /// Whether an object or a node exists at `path`.
    fn contains(&self, path: &str) -> StoreResult<bool>;

    /// Whether `path` holds data (as opposed to being a node or absent).
    fn is_object(&self, path: &str) -> StoreResult<bool>;

    /// Names of the direct children of `path`, sorted. Empty if absent.
    fn scan(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Last modification time of `path`, or `None` if it does not exist.
    fn mtime(&self, path: &str) -> StoreResult<Option<Mtime>>;

    /// Open the object at `path` for streaming reads.
    fn read(&self, path: &str) -> StoreResult<Box<dyn Read + Send>>;

    /// Open `path` for streaming writes, truncating any existing object.
    fn write(&self, path: &str) -> StoreResult<Box<dyn Write + Send>>;
}
