use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Mtime, Storage};

/// Storage backed by a directory tree on the local filesystem.
///
/// Storage paths map onto files below `root`; nodes are directories.
/// `set` writes through a temporary file in the destination directory and
/// renames it into place, so single-object writes are atomic on POSIX
/// filesystems.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (or create) a storage rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened filesystem storage");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto the filesystem, refusing traversal outside
    /// the root.
    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let mut resolved = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(c)), None) => resolved.push(c),
                _ => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_string(),
                        reason: format!("component {part:?} escapes the storage root"),
                    })
                }
            }
        }
        Ok(resolved)
    }

    fn ensure_parent(target: &Path) -> StoreResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn remove_fs(target: &Path) -> StoreResult<bool> {
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(target)?,
            Ok(_) => fs::remove_file(target)?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        Ok(true)
    }

    fn copy_tree(from: &Path, to: &Path) -> StoreResult<()> {
        for entry in WalkDir::new(from) {
            let entry = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            let rel = entry
                .path()
                .strip_prefix(from)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let dest = to.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else {
                Self::ensure_parent(&dest)?;
                fs::copy(entry.path(), &dest)?;
            }
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let target = self.resolve(path)?;
        match fs::read(&target) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path.to_string())),
            Err(e) if target.is_dir() => {
                debug!(path, error = %e, "read of a node");
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target)?;
        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        }
        let dir = target.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn move_path(&self, from: &str, to: &str) -> StoreResult<bool> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if !source.exists() {
            return Ok(false);
        }
        if source == target {
            return Ok(true);
        }
        Self::ensure_parent(&target)?;
        // rename(2) only replaces files and empty directories.
        if target.is_dir() || (source.is_dir() && target.exists()) {
            Self::remove_fs(&target)?;
        }
        fs::rename(&source, &target)?;
        Ok(true)
    }

    fn copy(&self, from: &str, to: &str) -> StoreResult<bool> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if !source.exists() {
            return Ok(false);
        }
        Self::remove_fs(&target)?;
        if source.is_dir() {
            Self::copy_tree(&source, &target)?;
        } else {
            Self::ensure_parent(&target)?;
            fs::copy(&source, &target)?;
        }
        Ok(true)
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "refusing to remove the storage root".into(),
            });
        }
        Self::remove_fs(&target)
    }

    fn contains(&self, path: &str) -> StoreResult<bool> {
        Ok(self.resolve(path)?.exists())
    }

    fn is_object(&self, path: &str) -> StoreResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn scan(&self, path: &str) -> StoreResult<Vec<String>> {
        let target = self.resolve(path)?;
        let entries = match fs::read_dir(&target) {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound) || target.is_file() => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn mtime(&self, path: &str) -> StoreResult<Option<Mtime>> {
        let target = self.resolve(path)?;
        let meta = match fs::metadata(&target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = meta.modified()?;
        let micros = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as Mtime)
            .unwrap_or_default();
        Ok(Some(micros))
    }

    fn read(&self, path: &str) -> StoreResult<Box<dyn Read + Send>> {
        let target = self.resolve(path)?;
        match File::open(&target) {
            Ok(file) if target.is_file() => Ok(Box::new(file)),
            Ok(_) => Err(StoreError::NotFound(path.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &str) -> StoreResult<Box<dyn Write + Send>> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target)?;
        Ok(Box::new(File::create(&target)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::copy_stream;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FsStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::open(dir.path().join("repo")).unwrap();
        (dir, storage)
    }

    #[test]
    fn set_get_roundtrip() {
        let (_dir, s) = storage();
        s.set("/site/ROOT/Entity.object", b"root").unwrap();
        assert_eq!(s.get("/site/ROOT/Entity.object").unwrap(), b"root");
        assert!(s.is_object("/site/ROOT/Entity.object").unwrap());
        assert!(s.contains("/site/ROOT").unwrap());
        assert!(!s.is_object("/site/ROOT").unwrap());
    }

    #[test]
    fn get_missing_and_node() {
        let (_dir, s) = storage();
        s.set("/a/b", b"x").unwrap();
        assert!(matches!(s.get("/a/c"), Err(StoreError::NotFound(_))));
        assert!(matches!(s.get("/a"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn traversal_is_rejected() {
        let (_dir, s) = storage();
        assert!(matches!(s.get("/../etc/passwd"), Err(StoreError::InvalidPath { .. })));
        assert!(matches!(s.remove("/"), Err(StoreError::InvalidPath { .. })));
    }

    #[test]
    fn scan_sorted() {
        let (_dir, s) = storage();
        s.set("/p/b/Entity.object", b"").unwrap();
        s.set("/p/a/Entity.object", b"").unwrap();
        s.set("/p/Entity.object", b"").unwrap();
        assert_eq!(s.scan("/p").unwrap(), vec!["Entity.object", "a", "b"]);
        assert!(s.scan("/missing").unwrap().is_empty());
        assert!(s.scan("/p/Entity.object").unwrap().is_empty());
    }

    #[test]
    fn move_directory_over_existing() {
        let (_dir, s) = storage();
        s.set("/src/Entity.object", b"new").unwrap();
        s.set("/dst/Entity.object", b"old").unwrap();
        s.set("/dst/stale.txt", b"stale").unwrap();
        assert!(s.move_path("/src", "/dst").unwrap());
        assert_eq!(s.get("/dst/Entity.object").unwrap(), b"new");
        assert!(!s.contains("/dst/stale.txt").unwrap());
        assert!(!s.contains("/src").unwrap());
        assert!(!s.move_path("/src", "/dst").unwrap());
    }

    #[test]
    fn move_file_over_file() {
        let (_dir, s) = storage();
        s.set("/a/Entity.object.tmp1", b"new").unwrap();
        s.set("/a/Entity.object", b"old").unwrap();
        assert!(s.move_path("/a/Entity.object.tmp1", "/a/Entity.object").unwrap());
        assert_eq!(s.get("/a/Entity.object").unwrap(), b"new");
    }

    #[test]
    fn copy_tree_and_remove() {
        let (_dir, s) = storage();
        s.set("/a/Entity.object", b"e").unwrap();
        s.set("/a/b/Entity.object", b"child").unwrap();
        assert!(s.copy("/a", "/c").unwrap());
        assert_eq!(s.get("/c/b/Entity.object").unwrap(), b"child");
        assert!(s.remove("/a").unwrap());
        assert!(!s.contains("/a").unwrap());
        assert!(!s.remove("/a").unwrap());
    }

    #[test]
    fn mtime_present_and_absent() {
        let (_dir, s) = storage();
        s.set("/a", b"1").unwrap();
        assert!(s.mtime("/a").unwrap().unwrap() > 0);
        assert_eq!(s.mtime("/nope").unwrap(), None);
    }

    #[test]
    fn streaming_roundtrip() {
        let (_dir, s) = storage();
        let payload = vec![42u8; 50_000];
        {
            let mut w = s.write("/res/blob.bin").unwrap();
            copy_stream(&mut payload.as_slice(), &mut w, 1000).unwrap();
        }
        let mut back = Vec::new();
        s.read("/res/blob.bin").unwrap().read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
        assert!(matches!(s.read("/res"), Err(StoreError::NotFound(_))));
    }
}
