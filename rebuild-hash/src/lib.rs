//! Content hashing primitives shared by the rebuild build engine.
//!
//! [`Hash`] is the 32-byte identity used for files, directory trees, recipe
//! code, tools, and request keys. Directory hashing sorts entries by name
//! before folding so that two trees with identical contents hash identically
//! regardless of the order entries were created on disk.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Errors produced while hashing bytes, files, or directory trees.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// An I/O error occurred while reading a file or directory entry.
    #[error("io failure hashing {path}: {source}")]
    Io {
        /// Path being read when the error occurred.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A hex string failed to decode into a [`Hash`].
    #[error("invalid hex hash string: {0}")]
    Parse(String),
}

/// A 256-bit content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the identity element for [`Hash::combine`].
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// XOR-combines two hashes. Used to fold directory entries and to
    /// compose request keys from several independent inputs.
    #[must_use]
    pub fn combine(self, other: Hash) -> Hash {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = self.0[i] ^ other.0[i];
        }
        Hash(out)
    }

    /// Encodes this hash as a 64-character lowercase hex string.
    #[must_use]
    pub fn hex_encode(self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a 64-character lowercase hex string into a [`Hash`].
    pub fn hex_decode(s: &str) -> Result<Hash, HashError> {
        let bytes = hex::decode(s).map_err(|_| HashError::Parse(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(HashError::Parse(s.to_string()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.hex_encode())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex_encode())
    }
}

const CHUNK_SIZE: usize = 8 * 1024;

/// Hashes an in-memory byte slice in one shot.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Hashes a regular file's contents, streaming in chunks so large files
/// never need to be loaded into memory whole.
pub fn hash_file(path: &Path) -> Result<Hash, HashError> {
    let mut file = fs::File::open(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(Hash(out))
}

/// Hashes a file or a directory tree.
///
/// A regular file hashes identically to [`hash_file`]. A directory's hash
/// folds in each child's name and recursive content hash, sorted
/// lexicographically by name, so the result is independent of the order
/// entries were created on disk. A child that cannot be read (permission
/// denied, broken symlink, removed mid-walk) is skipped with a warning
/// rather than aborting the whole hash or counting as a mismatch.
pub fn hash_tree(path: &Path) -> Result<Hash, HashError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return hash_file(path);
    }

    let mut names: Vec<std::ffi::OsString> = Vec::new();
    let entries = fs::read_dir(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    for entry in entries {
        match entry {
            Ok(e) => names.push(e.file_name()),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable directory entry while hashing");
            }
        }
    }
    names.sort();

    let mut acc = Hash::ZERO;
    for name in names {
        let child_path = path.join(&name);
        let name_hash = hash_bytes(name.to_string_lossy().as_bytes());
        let child_hash = match hash_tree(&child_path) {
            Ok(h) => h,
            Err(err) => {
                tracing::warn!(path = %child_path.display(), error = %err, "skipping unreadable child while hashing tree");
                continue;
            }
        };
        acc = acc.combine(name_hash).combine(child_hash);
    }
    Ok(acc)
}
