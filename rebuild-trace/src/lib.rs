//! Constructive-trace records.
//!
//! A [`Trace`] is the engine's memory of one successful recipe run: the
//! dependencies it actually read, their content hashes at the time, and the
//! hash of the output it produced. [`Trace::validate`] re-hashes each
//! recorded dependency in order and stops at the first mismatch, so a fully
//! cached no-op build costs at most one `stat`+hash per dependency prefix
//! that actually changed.

use rebuild_hash::{hash_file, hash_tree, Hash};
use rebuild_store::{Store, StoreError};
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"RBTR";
const VERSION: u32 = 1;
const MAX_PATH_LEN: u32 = 4096;

/// Errors raised while encoding, decoding, or validating a trace.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The file did not start with the `RBTR` magic bytes.
    #[error("not a trace file (bad magic)")]
    BadMagic,
    /// The on-disk version does not match the version this crate writes.
    #[error("unsupported trace version {0}")]
    BadVersion(u32),
    /// A dependency path exceeded the maximum recorded length.
    #[error("dependency path too long ({0} bytes)")]
    PathTooLong(usize),
    /// The file ended before a complete record could be read.
    #[error("trace file truncated")]
    Truncated,
    /// The loaded trace's request key did not match the key it was looked
    /// up under.
    #[error("trace request key mismatch")]
    KeyMismatch,
    /// No trace exists for the requested key.
    #[error("no trace found")]
    NotFound,
    /// Underlying storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Underlying hash error (re-hashing a dependency during validation).
    #[error("hash error: {0}")]
    Hash(#[from] rebuild_hash::HashError),
    /// Underlying I/O error not covered by [`StoreError`].
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single recorded dependency: the path it was read from and its content
/// hash at the time the owning recipe ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceDependency {
    /// Path of the dependency, relative or absolute as the recipe declared it.
    pub path: PathBuf,
    /// Content hash recorded for this dependency.
    pub hash: Hash,
}

/// A constructive trace for one recipe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    /// The request key this trace was recorded under.
    pub request_key: Hash,
    /// Dependencies, in the order they were first declared.
    pub dependencies: Vec<TraceDependency>,
    /// Content hash of the recipe's output directory at completion.
    pub output_tree_hash: Hash,
    /// CPU time spent executing the recipe, in milliseconds.
    pub cpu_ms: u64,
    /// Wall-clock time spent executing the recipe, in milliseconds.
    pub wall_ms: u64,
}

impl Trace {
    /// Creates an empty trace for `request_key` with zero timings.
    #[must_use]
    pub fn create(request_key: Hash) -> Self {
        Self {
            request_key,
            dependencies: Vec::new(),
            output_tree_hash: Hash::ZERO,
            cpu_ms: 0,
            wall_ms: 0,
        }
    }

    /// Appends a dependency. Order is significant: dependencies are
    /// validated in the order they were added.
    pub fn add_dependency(&mut self, path: impl Into<PathBuf>, hash: Hash) {
        self.dependencies.push(TraceDependency {
            path: path.into(),
            hash,
        });
    }

    /// Serializes this trace to the `RBTR` binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, TraceError> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.request_key.0);
        out.extend_from_slice(&(self.dependencies.len() as u64).to_le_bytes());
        for dep in &self.dependencies {
            let path_bytes = dep.path.to_string_lossy().into_owned().into_bytes();
            if path_bytes.len() > MAX_PATH_LEN as usize {
                return Err(TraceError::PathTooLong(path_bytes.len()));
            }
            out.extend_from_slice(&(path_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&path_bytes);
            out.extend_from_slice(&dep.hash.0);
        }
        out.extend_from_slice(&self.output_tree_hash.0);
        out.extend_from_slice(&self.cpu_ms.to_le_bytes());
        out.extend_from_slice(&self.wall_ms.to_le_bytes());
        Ok(out)
    }

    /// Parses the `RBTR` binary wire format, without checking the request
    /// key against an expected value (see [`Trace::decode_for_key`]).
    pub fn decode(bytes: &[u8]) -> Result<Self, TraceError> {
        let mut cur = Cursor::new(bytes);
        let magic: [u8; 4] = cur.take_array()?;
        if magic != MAGIC {
            return Err(TraceError::BadMagic);
        }
        let version = u32::from_le_bytes(cur.take_array()?);
        if version != VERSION {
            return Err(TraceError::BadVersion(version));
        }
        let request_key = Hash(cur.take_array()?);
        let dep_count = u64::from_le_bytes(cur.take_array()?);
        let mut dependencies = Vec::with_capacity(dep_count.min(4096) as usize);
        for _ in 0..dep_count {
            let path_len = u32::from_le_bytes(cur.take_array()?);
            if path_len > MAX_PATH_LEN {
                return Err(TraceError::PathTooLong(path_len as usize));
            }
            let path_bytes = cur.take_slice(path_len as usize)?;
            let path = PathBuf::from(String::from_utf8_lossy(path_bytes).into_owned());
            let hash = Hash(cur.take_array()?);
            dependencies.push(TraceDependency { path, hash });
        }
        let output_tree_hash = Hash(cur.take_array()?);
        let cpu_ms = u64::from_le_bytes(cur.take_array()?);
        let wall_ms = u64::from_le_bytes(cur.take_array()?);
        Ok(Trace {
            request_key,
            dependencies,
            output_tree_hash,
            cpu_ms,
            wall_ms,
        })
    }

    /// Writes this trace into `store`, keyed by [`Trace::request_key`].
    pub fn save(&self, store: &Store) -> Result<(), TraceError> {
        let bytes = self.encode()?;
        let path = store.trace_path(self.request_key)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    /// Loads the trace stored under `request_key`, rejecting a trace whose
    /// embedded key does not match (treated as corruption, not a plain miss,
    /// since it can only happen from a hash collision or on-disk tampering).
    pub fn load(request_key: Hash, store: &Store) -> Result<Self, TraceError> {
        if !store.trace_exists(request_key) {
            return Err(TraceError::NotFound);
        }
        let path = store.trace_path(request_key)?;
        let bytes = std::fs::read(&path)?;
        let trace = Self::decode(&bytes)?;
        if trace.request_key != request_key {
            return Err(TraceError::KeyMismatch);
        }
        Ok(trace)
    }

    /// Re-hashes each recorded dependency, in recorded order, and returns
    /// `true` only if every one still matches. Stops at the first mismatch
    /// (early cutoff) rather than hashing the remaining dependencies.
    #[must_use]
    pub fn validate(&self) -> bool {
        for dep in &self.dependencies {
            let path: &Path = dep.path.as_path();
            let current = if path.is_dir() {
                hash_tree(path)
            } else {
                hash_file(path)
            };
            match current {
                Ok(h) if h == dep.hash => continue,
                _ => return false,
            }
        }
        true
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], TraceError> {
        if self.pos + len > self.bytes.len() {
            return Err(TraceError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], TraceError> {
        let slice = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}
