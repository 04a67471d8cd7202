//! Recipe lifecycle state.

use rebuild_hash::Hash;
use std::path::PathBuf;
use std::time::Instant;

/// A recipe's position in its lifecycle.
///
/// ```text
/// Pending ──queued──> Running ──completes──> Complete
///                      │
///                      ├─requests dep──> Suspended ──dep ready──> Running
///                      │
///                      └─script error──> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeState {
    /// Created but not yet run.
    Pending,
    /// Currently executing its script function.
    Running,
    /// Blocked on a dependency resolving (synchronously, via recursive
    /// `build`, in the reference scheduler).
    Suspended,
    /// Finished successfully; its output is published.
    Complete,
    /// Finished with an error; terminal for this build invocation.
    Failed,
}

/// The runtime state of one target being built.
#[derive(Debug)]
pub struct Recipe {
    /// Immutable identity within a build.
    pub target_name: String,
    /// Current lifecycle state.
    pub state: RecipeState,
    /// Set at first cache probe, never mutated afterward.
    pub request_key: Option<Hash>,
    /// Dependency paths discovered so far, in first-observed order. Grows
    /// monotonically; never shrinks or reorders.
    pub declared_deps: Vec<PathBuf>,
    /// Hashes (binary and, if present, script module) of every tool this
    /// recipe has loaded via `deptool` so far this build.
    pub tool_hashes: Vec<Hash>,
    /// Output directory, assigned on first run.
    pub output_dir: Option<PathBuf>,
    /// Per-build scratch directory, assigned on first run.
    pub temp_dir: Option<PathBuf>,
    /// Wall-clock start of the most recent `Running` transition.
    pub start_time: Option<Instant>,
}

impl Recipe {
    /// Creates a fresh, `Pending` recipe for `target_name`.
    #[must_use]
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            state: RecipeState::Pending,
            request_key: None,
            declared_deps: Vec::new(),
            tool_hashes: Vec::new(),
            output_dir: None,
            temp_dir: None,
            start_time: None,
        }
    }

    /// Records `path` as a declared dependency if it has not already been
    /// recorded, preserving first-observed order.
    pub fn record_dep(&mut self, path: PathBuf) {
        if !self.declared_deps.contains(&path) {
            self.declared_deps.push(path);
        }
    }

    /// Records a tool's hash as used by this recipe, if not already
    /// recorded.
    pub fn record_tool_hash(&mut self, hash: Hash) {
        if !self.tool_hashes.contains(&hash) {
            self.tool_hashes.push(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_dep_is_idempotent_and_order_preserving() {
        let mut r = Recipe::new("app");
        r.record_dep(PathBuf::from("a"));
        r.record_dep(PathBuf::from("b"));
        r.record_dep(PathBuf::from("a"));
        assert_eq!(r.declared_deps, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn new_recipe_starts_pending_with_no_request_key() {
        let r = Recipe::new("x");
        assert_eq!(r.state, RecipeState::Pending);
        assert!(r.request_key.is_none());
    }
}
