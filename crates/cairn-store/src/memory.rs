use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Mtime, Storage};

#[derive(Clone, Debug)]
struct Blob {
    data: Vec<u8>,
    mtime: Mtime,
}

#[derive(Debug, Default)]
struct Tree {
    objects: BTreeMap<String, Blob>,
    /// Last handed-out mtime; keeps mtimes strictly increasing.
    clock: Mtime,
}

impl Tree {
    fn tick(&mut self) -> Mtime {
        let now = Utc::now().timestamp_micros();
        self.clock = now.max(self.clock + 1);
        self.clock
    }

    /// Keys at `path` or below it.
    fn subtree_keys(&self, path: &str) -> Vec<String> {
        let prefix = child_prefix(path);
        self.objects
            .keys()
            .filter(|k| k.as_str() == path || k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn remove_subtree(&mut self, path: &str) -> bool {
        let keys = self.subtree_keys(path);
        for key in &keys {
            self.objects.remove(key);
        }
        !keys.is_empty()
    }

    /// Re-root every key under `from` at `to`.
    fn rebase(key: &str, from: &str, to: &str) -> String {
        if key == from {
            return to.to_string();
        }
        let rest = &key[child_prefix(from).len()..];
        format!("{}{}", child_prefix(to), rest)
    }
}

fn child_prefix(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// In-memory, `BTreeMap`-based storage.
///
/// Intended for tests and embedding. Only objects are stored; nodes exist
/// implicitly as prefixes of object keys. Modification times are drawn from
/// the wall clock but forced to be strictly increasing, so every write is
/// observable as newer than the one before it.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tree: Arc<RwLock<Tree>>,
}

impl InMemoryStorage {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.tree.read().expect("lock poisoned").objects.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.read().expect("lock poisoned").objects.is_empty()
    }

    /// All object paths, sorted.
    pub fn all_paths(&self) -> Vec<String> {
        self.tree
            .read()
            .expect("lock poisoned")
            .objects
            .keys()
            .cloned()
            .collect()
    }

    /// Overwrite the mtime of an object. Useful for simulating out-of-band
    /// modifications in tests.
    pub fn touch(&self, path: &str) -> bool {
        let mut tree = self.tree.write().expect("lock poisoned");
        let now = tree.tick();
        match tree.objects.get_mut(path) {
            Some(blob) => {
                blob.mtime = now;
                true
            }
            None => false,
        }
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let tree = self.tree.read().expect("lock poisoned");
        tree.objects
            .get(path)
            .map(|b| b.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn set(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let mut tree = self.tree.write().expect("lock poisoned");
        let mtime = tree.tick();
        // An object replaces any node of the same name.
        let prefix = child_prefix(path);
        tree.objects.retain(|k, _| !k.starts_with(&prefix));
        tree.objects.insert(
            path.to_string(),
            Blob {
                data: data.to_vec(),
                mtime,
            },
        );
        Ok(())
    }

    fn move_path(&self, from: &str, to: &str) -> StoreResult<bool> {
        if from == to {
            return self.contains(from);
        }
        let mut tree = self.tree.write().expect("lock poisoned");
        let keys = tree.subtree_keys(from);
        if keys.is_empty() {
            return Ok(false);
        }
        let moved: Vec<(String, Blob)> = keys
            .iter()
            .filter_map(|k| tree.objects.remove(k).map(|b| (Tree::rebase(k, from, to), b)))
            .collect();
        tree.remove_subtree(to);
        tree.objects.extend(moved);
        Ok(true)
    }

    fn copy(&self, from: &str, to: &str) -> StoreResult<bool> {
        let mut tree = self.tree.write().expect("lock poisoned");
        let keys = tree.subtree_keys(from);
        if keys.is_empty() {
            return Ok(false);
        }
        let copies: Vec<(String, Vec<u8>)> = keys
            .iter()
            .filter_map(|k| {
                tree.objects
                    .get(k)
                    .map(|b| (Tree::rebase(k, from, to), b.data.clone()))
            })
            .collect();
        tree.remove_subtree(to);
        for (key, data) in copies {
            let mtime = tree.tick();
            tree.objects.insert(key, Blob { data, mtime });
        }
        Ok(true)
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let mut tree = self.tree.write().expect("lock poisoned");
        Ok(tree.remove_subtree(path))
    }

    fn contains(&self, path: &str) -> StoreResult<bool> {
        let tree = self.tree.read().expect("lock poisoned");
        let prefix = child_prefix(path);
        Ok(tree.objects.contains_key(path)
            || tree
                .objects
                .range(prefix.clone()..)
                .next()
                .is_some_and(|(k, _)| k.starts_with(&prefix)))
    }

    fn is_object(&self, path: &str) -> StoreResult<bool> {
        let tree = self.tree.read().expect("lock poisoned");
        Ok(tree.objects.contains_key(path))
    }

    fn scan(&self, path: &str) -> StoreResult<Vec<String>> {
        let tree = self.tree.read().expect("lock poisoned");
        let prefix = child_prefix(path);
        let mut names: Vec<String> = tree
            .objects
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn mtime(&self, path: &str) -> StoreResult<Option<Mtime>> {
        let tree = self.tree.read().expect("lock poisoned");
        if let Some(blob) = tree.objects.get(path) {
            return Ok(Some(blob.mtime));
        }
        let prefix = child_prefix(path);
        Ok(tree
            .objects
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, b)| b.mtime)
            .max())
    }

    fn read(&self, path: &str) -> StoreResult<Box<dyn Read + Send>> {
        let data = self.get(path)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn write(&self, path: &str) -> StoreResult<Box<dyn Write + Send>> {
        self.set(path, &[])?;
        Ok(Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            path: path.to_string(),
        }))
    }
}

/// Streaming writer appending straight into the shared tree.
struct MemoryWriter {
    tree: Arc<RwLock<Tree>>,
    path: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut tree = self.tree.write().expect("lock poisoned");
        let mtime = tree.tick();
        let blob = tree.objects.entry(self.path.clone()).or_insert_with(|| Blob {
            data: Vec::new(),
            mtime,
        });
        blob.data.extend_from_slice(buf);
        blob.mtime = mtime;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::copy_stream;

    fn seeded() -> InMemoryStorage {
        let s = InMemoryStorage::new();
        s.set("/site/ROOT/Entity.object", b"root").unwrap();
        s.set("/site/ROOT/page/Entity.object", b"page").unwrap();
        s.set("/site/ROOT/page/logo.png", b"png").unwrap();
        s
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn set_and_get() {
        let s = InMemoryStorage::new();
        s.set("/a/b", b"hello").unwrap();
        assert_eq!(s.get("/a/b").unwrap(), b"hello");
    }

    #[test]
    fn get_missing_is_not_found() {
        let s = InMemoryStorage::new();
        assert!(matches!(s.get("/nope"), Err(StoreError::NotFound(p)) if p == "/nope"));
    }

    #[test]
    fn remove_subtree() {
        let s = seeded();
        assert!(s.remove("/site/ROOT/page").unwrap());
        assert!(!s.contains("/site/ROOT/page").unwrap());
        assert!(s.is_object("/site/ROOT/Entity.object").unwrap());
        assert!(!s.remove("/site/ROOT/page").unwrap());
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    #[test]
    fn contains_and_is_object() {
        let s = seeded();
        assert!(s.contains("/site").unwrap());
        assert!(!s.is_object("/site").unwrap());
        assert!(s.is_object("/site/ROOT/page/logo.png").unwrap());
        assert!(!s.contains("/sit").unwrap());
    }

    #[test]
    fn scan_lists_direct_children_sorted() {
        let s = seeded();
        assert_eq!(s.scan("/site/ROOT").unwrap(), vec!["Entity.object", "page"]);
        assert_eq!(s.scan("/").unwrap(), vec!["site"]);
        assert!(s.scan("/missing").unwrap().is_empty());
    }

    #[test]
    fn set_replaces_node_with_object() {
        let s = seeded();
        s.set("/site/ROOT/page", b"flat").unwrap();
        assert!(s.is_object("/site/ROOT/page").unwrap());
        assert!(!s.contains("/site/ROOT/page/logo.png").unwrap());
    }

    // -----------------------------------------------------------------------
    // Move / copy
    // -----------------------------------------------------------------------

    #[test]
    fn move_subtree() {
        let s = seeded();
        assert!(s.move_path("/site/ROOT/page", "/_tmp/x").unwrap());
        assert!(!s.contains("/site/ROOT/page").unwrap());
        assert_eq!(s.get("/_tmp/x/logo.png").unwrap(), b"png");
        assert_eq!(s.get("/_tmp/x/Entity.object").unwrap(), b"page");
    }

    #[test]
    fn move_replaces_destination() {
        let s = InMemoryStorage::new();
        s.set("/a.tmp", b"new").unwrap();
        s.set("/a", b"old").unwrap();
        assert!(s.move_path("/a.tmp", "/a").unwrap());
        assert_eq!(s.get("/a").unwrap(), b"new");
        assert!(!s.contains("/a.tmp").unwrap());
    }

    #[test]
    fn move_missing_returns_false() {
        let s = InMemoryStorage::new();
        assert!(!s.move_path("/x", "/y").unwrap());
    }

    #[test]
    fn move_does_not_touch_prefix_siblings() {
        let s = InMemoryStorage::new();
        s.set("/a/x", b"1").unwrap();
        s.set("/ab/x", b"2").unwrap();
        s.move_path("/a", "/c").unwrap();
        assert_eq!(s.get("/ab/x").unwrap(), b"2");
        assert_eq!(s.get("/c/x").unwrap(), b"1");
    }

    #[test]
    fn copy_keeps_source() {
        let s = seeded();
        assert!(s.copy("/site/ROOT/page", "/site/ROOT/page2").unwrap());
        assert_eq!(s.get("/site/ROOT/page/logo.png").unwrap(), b"png");
        assert_eq!(s.get("/site/ROOT/page2/logo.png").unwrap(), b"png");
    }

    // -----------------------------------------------------------------------
    // Mtime
    // -----------------------------------------------------------------------

    #[test]
    fn mtime_strictly_increases() {
        let s = InMemoryStorage::new();
        s.set("/a", b"1").unwrap();
        let first = s.mtime("/a").unwrap().unwrap();
        s.set("/a", b"2").unwrap();
        let second = s.mtime("/a").unwrap().unwrap();
        assert!(second > first);
        assert!(s.touch("/a"));
        assert!(s.mtime("/a").unwrap().unwrap() > second);
    }

    #[test]
    fn mtime_of_node_and_missing() {
        let s = seeded();
        let leaf = s.mtime("/site/ROOT/page/logo.png").unwrap().unwrap();
        assert_eq!(s.mtime("/site/ROOT/page").unwrap(), Some(leaf));
        assert_eq!(s.mtime("/missing").unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    #[test]
    fn streaming_write_and_read() {
        let s = InMemoryStorage::new();
        let payload = vec![7u8; 20_000];
        let mut w = s.write("/big.bin").unwrap();
        copy_stream(&mut payload.as_slice(), &mut w, 4096).unwrap();
        drop(w);
        let mut r = s.read("/big.bin").unwrap();
        let mut back = Vec::new();
        r.read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn debug_format() {
        let s = seeded();
        let debug = format!("{s:?}");
        assert!(debug.contains("InMemoryStorage"));
        assert!(debug.contains("object_count"));
    }
}
