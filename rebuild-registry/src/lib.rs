//! Target and tool registries.
//!
//! The target registry maps a target name to the script function that
//! implements it, populated while a build-definition file loads. The tool
//! registry maps a tool name to its resolved binary and optional script-side
//! API module, each hashed so that upgrading a compiler invalidates every
//! recipe that used it.

use rebuild_hash::{hash_file, Hash};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors raised by registry lookups and population.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// `depend_on`/`register_target` referenced a target never registered.
    #[error("target not found: {0}")]
    TargetNotFound(String),
    /// `deptool` referenced a tool not found on any configured search path.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// Hashing a tool binary or its API module failed.
    #[error("hash error: {0}")]
    Hash(#[from] rebuild_hash::HashError),
}

/// One entry in the target registry: the script function implementing a
/// build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    /// Name of the script-side function that builds this target.
    pub function_name: String,
}

/// Maps target name to the script function that implements it.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: HashMap<String, TargetEntry>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` as implemented by `function_name`. Re-registration
    /// replaces the prior entry.
    pub fn register(&mut self, name: impl Into<String>, function_name: impl Into<String>) {
        let name = name.into();
        let entry = TargetEntry {
            function_name: function_name.into(),
        };
        if self.targets.insert(name.clone(), entry).is_some() {
            tracing::warn!(target = %name, "target re-registered, replacing prior entry");
        }
    }

    /// Looks up the script function implementing `name`.
    pub fn lookup(&self, name: &str) -> Result<&TargetEntry, RegistryError> {
        self.targets
            .get(name)
            .ok_or_else(|| RegistryError::TargetNotFound(name.to_string()))
    }

    /// Returns whether `name` has been registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Enumerates all registered target names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

/// One entry in the tool registry: a resolved binary plus an optional
/// script-side API module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEntry {
    /// Path to the tool's executable.
    pub binary_path: PathBuf,
    /// Hash of the executable's bytes.
    pub binary_hash: Hash,
    /// Path to a sibling script module exposing a friendlier API for this
    /// tool, if one exists.
    pub module_path: Option<PathBuf>,
    /// Hash of the module's bytes, or `Hash::ZERO` if no module exists.
    pub module_hash: Hash,
}

/// Maps tool name to its resolved, hashed binary and optional API module.
/// Lookups are memoized: repeated `load` calls for the same name return the
/// same entry without re-resolving or re-hashing.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
    search_dirs: Vec<PathBuf>,
    module_ext: String,
}

impl ToolRegistry {
    /// Creates a registry that searches `search_dirs` in order, looking for
    /// a sibling module named `<tool>.<module_ext>` next to each resolved
    /// binary.
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>, module_ext: impl Into<String>) -> Self {
        Self {
            tools: HashMap::new(),
            search_dirs,
            module_ext: module_ext.into(),
        }
    }

    /// Creates a registry that searches the process `PATH`.
    #[must_use]
    pub fn from_path_env(module_ext: impl Into<String>) -> Self {
        let dirs = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::new(dirs, module_ext)
    }

    /// Resolves, hashes, and caches the tool named `name`. Subsequent calls
    /// return the cached entry.
    pub fn load(&mut self, name: &str) -> Result<&ToolEntry, RegistryError> {
        if !self.tools.contains_key(name) {
            let entry = self.resolve(name)?;
            let _ = self.tools.insert(name.to_string(), entry);
        }
        Ok(self.tools.get(name).expect("just inserted"))
    }

    fn resolve(&self, name: &str) -> Result<ToolEntry, RegistryError> {
        let binary_path = self
            .search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))?;

        let binary_hash = hash_file(&binary_path)?;

        let module_path = binary_path
            .parent()
            .map(|dir| dir.join(format!("{name}.{}", self.module_ext)))
            .filter(|p| p.is_file());

        let module_hash = match &module_path {
            Some(p) => hash_file(p)?,
            None => Hash::ZERO,
        };

        Ok(ToolEntry {
            binary_path,
            binary_hash,
            module_path,
            module_hash,
        })
    }
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}
