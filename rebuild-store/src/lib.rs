//! Local content-addressed storage for the rebuild build engine.
//!
//! A [`Store`] owns a directory tree with three children: `traces/` (keyed
//! by request key), `objects/` (keyed by content hash), and `tmp/` (scratch
//! directories for in-flight recipes). Both `traces/` and `objects/` are
//! sharded one level deep by the first byte of the key so that no single
//! directory ends up with an unmanageable number of entries.

use rebuild_hash::{hash_tree, Hash};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors raised by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred while reading or writing the store.
    #[error("io failure at {path}: {source}")]
    Io {
        /// Path being accessed when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Hashing an object or tree to store it failed.
    #[error("hash failure: {0}")]
    Hash(#[from] rebuild_hash::HashError),
    /// `$HOME` is unset and no explicit store root was given.
    #[error("cannot determine store root: $HOME is not set")]
    NoHome,
}

/// Application name used to namespace the default store root under
/// `$XDG_DATA_HOME` or `$HOME/.local/share`.
pub const APP_NAME: &str = "rebuild";

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Determines the default store root from the environment, without creating
/// it. `$XDG_DATA_HOME/<app>` is used when that variable is set to an
/// absolute path; otherwise falls back to `$HOME/.local/share/<app>`.
pub fn discover_root() -> Result<PathBuf, StoreError> {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        let p = PathBuf::from(&xdg);
        if p.is_absolute() {
            return Ok(p.join(APP_NAME));
        }
    }
    let home = std::env::var("HOME").map_err(|_| StoreError::NoHome)?;
    Ok(PathBuf::from(home).join(".local").join("share").join(APP_NAME))
}

/// A content-addressed store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Opens (creating if necessary) a store rooted at `root`.
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        let store = Self { root };
        fs::create_dir_all(store.traces_dir()).map_err(|e| io_err(&store.traces_dir(), e))?;
        fs::create_dir_all(store.objects_dir()).map_err(|e| io_err(&store.objects_dir(), e))?;
        fs::create_dir_all(store.tmp_base()).map_err(|e| io_err(&store.tmp_base(), e))?;
        Ok(store)
    }

    /// Opens the default store root per [`discover_root`].
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(discover_root()?)
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn traces_dir(&self) -> PathBuf {
        self.root.join("traces")
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn tmp_base(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn sharded_path(base: &Path, key: Hash) -> PathBuf {
        let hex = key.hex_encode();
        let (shard, rest) = hex.split_at(2);
        base.join(shard).join(rest)
    }

    fn ensure_shard(base: &Path, key: Hash) -> Result<PathBuf, StoreError> {
        let hex = key.hex_encode();
        let (shard, _rest) = hex.split_at(2);
        let shard_dir = base.join(shard);
        fs::create_dir_all(&shard_dir).map_err(|e| io_err(&shard_dir, e))?;
        Ok(Self::sharded_path(base, key))
    }

    /// Computes the on-disk path for a trace keyed by `key`, creating its
    /// shard directory if absent.
    pub fn trace_path(&self, key: Hash) -> Result<PathBuf, StoreError> {
        Self::ensure_shard(&self.traces_dir(), key)
    }

    /// Computes the on-disk path for an object keyed by `key`, creating its
    /// shard directory if absent.
    pub fn object_path(&self, key: Hash) -> Result<PathBuf, StoreError> {
        Self::ensure_shard(&self.objects_dir(), key)
    }

    /// Returns whether a trace for `key` exists, without reading its contents.
    #[must_use]
    pub fn trace_exists(&self, key: Hash) -> bool {
        Self::sharded_path(&self.traces_dir(), key).is_file()
    }

    /// Returns whether an object for `key` exists, without reading its contents.
    #[must_use]
    pub fn object_exists(&self, key: Hash) -> bool {
        Self::sharded_path(&self.objects_dir(), key).exists()
    }

    /// Creates a fresh scratch directory for a target, named
    /// `<target>_<unix_secs>_<pid>` so that concurrent processes never
    /// collide.
    pub fn tmp_dir(&self, target_name: &str) -> Result<PathBuf, StoreError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let pid = std::process::id();
        let sanitized: String = target_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let dir = self.tmp_base().join(format!("{sanitized}_{secs}_{pid}"));
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(dir)
    }

    /// Removes the scratch area (`tmp/`).
    pub fn clean_tmp(&self) -> Result<(), StoreError> {
        let dir = self.tmp_base();
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(())
    }

    /// Removes `traces/` and `objects/` in addition to `tmp/`.
    pub fn clean_all(&self) -> Result<(), StoreError> {
        self.clean_tmp()?;
        for dir in [self.traces_dir(), self.objects_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            }
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        Ok(())
    }

    /// Writes raw bytes into the object store under their content hash,
    /// returning the hash.
    pub fn put_object(&self, data: &[u8]) -> Result<Hash, StoreError> {
        let hash = rebuild_hash::hash_bytes(data);
        let path = self.object_path(hash)?;
        if !path.exists() {
            fs::write(&path, data).map_err(|e| io_err(&path, e))?;
        }
        Ok(hash)
    }

    /// Recursively copies a directory tree into the object store, keyed by
    /// its structural content hash, and returns that hash. Used so that a
    /// cache hit can restore output bytes rather than merely confirm a
    /// hash match.
    pub fn put_object_tree(&self, dir: &Path) -> Result<Hash, StoreError> {
        let hash = hash_tree(dir)?;
        let dest = self.object_path(hash)?;
        if !dest.exists() {
            copy_tree(dir, &dest)?;
        }
        Ok(hash)
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    for entry in fs::read_dir(src).map_err(|e| io_err(src, e))? {
        let entry = entry.map_err(|e| io_err(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| io_err(&from, e))?;
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to).map_err(|e| io_err(&from, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_layout() {
        let (dir, _store) = open_temp();
        let root = dir.path().join("store");
        assert!(root.join("traces").is_dir());
        assert!(root.join("objects").is_dir());
        assert!(root.join("tmp").is_dir());
    }

    #[test]
    fn trace_path_is_sharded_and_idempotent() {
        let (_dir, store) = open_temp();
        let key = rebuild_hash::hash_bytes(b"x");
        let p1 = store.trace_path(key).unwrap();
        let p2 = store.trace_path(key).unwrap();
        assert_eq!(p1, p2);
        let hex = key.hex_encode();
        assert!(p1.ends_with(&hex[2..]));
        assert!(p1.parent().unwrap().ends_with(&hex[..2]));
    }

    #[test]
    fn trace_exists_false_until_written() {
        let (_dir, store) = open_temp();
        let key = rebuild_hash::hash_bytes(b"y");
        assert!(!store.trace_exists(key));
        let path = store.trace_path(key).unwrap();
        std::fs::write(&path, b"data").unwrap();
        assert!(store.trace_exists(key));
    }

    #[test]
    fn tmp_dir_names_are_unique_per_call() {
        let (_dir, store) = open_temp();
        let a = store.tmp_dir("foo").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(a.is_dir());
    }

    #[test]
    fn put_object_is_content_addressed() {
        let (_dir, store) = open_temp();
        let h1 = store.put_object(b"hello").unwrap();
        let h2 = store.put_object(b"hello").unwrap();
        assert_eq!(h1, h2);
        assert!(store.object_exists(h1));
    }

    #[test]
    fn clean_tmp_removes_scratch_but_keeps_objects() {
        let (_dir, store) = open_temp();
        let h = store.put_object(b"keep me").unwrap();
        let _ = store.tmp_dir("t").unwrap();
        store.clean_tmp().unwrap();
        assert!(store.object_exists(h));
        assert!(store.root().join("tmp").is_dir());
    }

    #[test]
    fn clean_all_removes_objects_and_traces() {
        let (_dir, store) = open_temp();
        let h = store.put_object(b"gone").unwrap();
        store.clean_all().unwrap();
        assert!(!store.object_exists(h));
    }
}
