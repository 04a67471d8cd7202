//! Error taxonomy for the build engine.

use std::path::PathBuf;

/// Errors the scheduler can surface from a `build()` call.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A filesystem operation failed.
    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),
    /// Hashing a file or tree failed.
    #[error("hash failure: {0}")]
    HashFailure(#[from] rebuild_hash::HashError),
    /// Persisting or loading store state failed outside the cache-miss path.
    #[error("store failure: {0}")]
    StoreFailure(#[from] rebuild_store::StoreError),
    /// The build-definition script failed to compile.
    #[error("script load failure: {0}")]
    ScriptLoadFailure(String),
    /// A recipe's script raised an error while running.
    #[error("script execution failure in target {target}: {source}")]
    ScriptExecFailure {
        /// The target whose recipe failed.
        target: String,
        /// Underlying script error.
        #[source]
        source: rebuild_script::ScriptError,
    },
    /// A `sys()` subprocess exited non-zero and the recipe chose to
    /// propagate that as a build failure.
    #[error("process failure running {command:?}: exit code {exit_code}")]
    ProcessFailure {
        /// Argument vector of the failed subprocess.
        command: Vec<String>,
        /// Its exit code.
        exit_code: i32,
    },
    /// A dependency cycle was detected among the listed targets.
    #[error("dependency cycle detected among targets: {0:?}")]
    DependencyCycle(Vec<String>),
    /// `depend_on` (or a CLI target argument) referenced a target absent
    /// from the target registry.
    #[error("target not found: {0}")]
    TargetNotFound(String),
    /// A tool referenced by `deptool` could not be resolved.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// The overall build failed because the named target (the first to
    /// fail) could not be built.
    #[error("build failed: target {target} did not complete: {source}")]
    BuildFailed {
        /// The first target whose recipe failed.
        target: String,
        /// Underlying cause.
        #[source]
        source: Box<BuildError>,
    },
    /// No build-definition file could be located by walking upward from
    /// the current directory.
    #[error("no build definition file found starting from {0}")]
    BuildFileNotFound(PathBuf),
}

impl From<rebuild_registry::RegistryError> for BuildError {
    fn from(e: rebuild_registry::RegistryError) -> Self {
        match e {
            rebuild_registry::RegistryError::TargetNotFound(t) => BuildError::TargetNotFound(t),
            rebuild_registry::RegistryError::ToolNotFound(t) => BuildError::ToolNotFound(t),
            rebuild_registry::RegistryError::Hash(h) => BuildError::HashFailure(h),
        }
    }
}
