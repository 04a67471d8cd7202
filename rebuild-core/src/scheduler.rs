//! The build scheduler.
//!
//! The reference scheduler models suspension as synchronous recursion: when
//! a recipe's script calls `depend_on`, the host primitive calls straight
//! back into [`Scheduler::build`] and blocks the native call frame until the
//! dependency resolves (see the binding note in the crate's script bridge).
//! A recipe's [`RecipeState`] still visits `Suspended` around that nested
//! call so the state machine is externally correct; there is simply no
//! separate fiber to resume — the call stack *is* the continuation.
//!
//! [`Scheduler`] splits its fields into the Lua bridge itself and
//! everything else ([`SchedulerState`]) so that a recipe's script can call
//! back into the rest of the scheduler (via [`HostAdapter`]) while it still
//! holds a live reference to the bridge: the bridge's public methods take
//! `&self`, matching `mlua::Lua`'s own `&self`-based API, so a nested
//! `depend_on` can reenter `call_target` for another target without ever
//! needing a second mutable borrow of the interpreter.

use crate::config::Config;
use crate::error::BuildError;
use crate::glob;
use crate::recipe::{Recipe, RecipeState};
use rebuild_graph::{NodeId, DAG};
use rebuild_hash::{hash_bytes, hash_tree, Hash};
use rebuild_registry::{TargetRegistry, ToolRegistry};
use rebuild_script::{HostContext, HostError, LuaScriptBridge, SysResult, ToolHandle};
use rebuild_store::Store;
use rebuild_trace::Trace;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Script runtime file extension used when looking for a tool's
/// script-side API module next to its binary.
const TOOL_MODULE_EXT: &str = "lua";

/// Everything the scheduler owns except the script interpreter itself.
struct SchedulerState {
    store: Store,
    tools: ToolRegistry,
    targets: TargetRegistry,
    config: Config,
    script_source: String,
    script_hash: Hash,
    recipes: HashMap<String, Recipe>,
    completed: HashMap<String, (PathBuf, Hash)>,
    active_stack: Vec<String>,
    /// Backstop cycle detector independent of `active_stack`: every
    /// `depend_on` records a "must run before" edge here, so a cycle is
    /// also caught structurally, not only via the active recursion chain.
    dep_graph: DAG<String, ()>,
    graph_nodes: HashMap<String, NodeId>,
    /// The first target whose own recipe genuinely failed this build, set
    /// once and never overwritten. Lets a deeply nested `depend_on` chain
    /// report the true root cause instead of whichever caller's frame last
    /// wrapped the error.
    first_failed_target: Option<String>,
}

/// Owns every recipe's runtime state and drives builds to completion.
pub struct Scheduler {
    script: LuaScriptBridge,
    state: SchedulerState,
}

/// A target's registration and cache status, as reported by
/// [`Scheduler::inspect`].
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// The script function registered for this target.
    pub function_name: String,
    /// Dependencies discovered so far this build (empty if the target has
    /// never run in this `Scheduler` instance).
    pub declared_deps: Vec<PathBuf>,
    /// Whether a trace matching the target's current request key exists
    /// in the store (a prior build may still invalidate it on content
    /// grounds; this only reflects presence of the on-disk trace).
    pub cached: bool,
}

impl Scheduler {
    /// Creates a scheduler with the given configuration, opening (and
    /// creating if necessary) its content-addressed store.
    pub fn new(config: Config) -> Result<Self, BuildError> {
        let root = match &config.store_root {
            Some(r) => r.clone(),
            None => rebuild_store::discover_root()?,
        };
        let store = Store::open(root)?;
        Ok(Self {
            script: LuaScriptBridge::new(),
            state: SchedulerState {
                store,
                tools: ToolRegistry::from_path_env(TOOL_MODULE_EXT),
                targets: TargetRegistry::new(),
                config,
                script_source: String::new(),
                script_hash: Hash::ZERO,
                recipes: HashMap::new(),
                completed: HashMap::new(),
                active_stack: Vec::new(),
                dep_graph: DAG::new(),
                graph_nodes: HashMap::new(),
                first_failed_target: None,
            },
        })
    }

    /// Loads a build-definition file, executing its top-level statements
    /// (which are expected to call `register_target`) and keeping its
    /// source around so each recipe's request key can be computed from
    /// just its own function body (see [`SchedulerState::recipe_code_hash`]).
    pub fn load_build_file(&mut self, path: &Path) -> Result<(), BuildError> {
        let source = std::fs::read_to_string(path)?;
        self.state.script_hash = hash_bytes(source.as_bytes());
        self.state.script_source = source.clone();
        let mut adapter = HostAdapter {
            state: &mut self.state,
            script: &self.script,
            target: String::from("<build-file>"),
        };
        self.script
            .load_build_file(&source, &mut adapter)
            .map_err(|e| BuildError::ScriptLoadFailure(e.to_string()))
    }

    /// The underlying store, exposed for `rebuild clean` and `rebuild
    /// query`.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.state.store
    }

    /// The target registry, exposed for `rebuild query`.
    #[must_use]
    pub fn targets(&self) -> &TargetRegistry {
        &self.state.targets
    }

    /// Returns the recipe state for a target that has been referenced at
    /// least once this build, if any.
    #[must_use]
    pub fn recipe_state(&self, target: &str) -> Option<RecipeState> {
        self.state.recipes.get(target).map(|r| r.state)
    }

    /// Reports a target's registered function, any dependencies already
    /// discovered this build, and whether a valid trace for it exists in
    /// the store — without running its recipe. Requires
    /// [`Scheduler::load_build_file`] to have been called first so the
    /// recipe-code hash is known.
    pub fn inspect(&self, target: &str) -> Result<TargetInfo, BuildError> {
        let entry = self.state.targets.lookup(target).map_err(BuildError::from)?;
        let declared_deps = self
            .state
            .recipes
            .get(target)
            .map(|r| r.declared_deps.clone())
            .unwrap_or_default();
        let request_key = self.state.request_key_for(target);
        let cached = self.state.store.trace_exists(request_key);
        Ok(TargetInfo {
            function_name: entry.function_name.clone(),
            declared_deps,
            cached,
        })
    }

    /// Builds `target`, returning its output directory. Idempotent within a
    /// single `Scheduler` instance: a target already in `completed` returns
    /// immediately without touching its recipe or re-running anything.
    pub fn build(&mut self, target: &str) -> Result<PathBuf, BuildError> {
        self.state.build(target, &self.script)
    }
}

impl SchedulerState {
    fn get_or_create_recipe(&mut self, target: &str) -> Result<(), BuildError> {
        if !self.recipes.contains_key(target) {
            if !self.targets.contains(target) {
                return Err(BuildError::TargetNotFound(target.to_string()));
            }
            let _ = self.recipes.insert(target.to_string(), Recipe::new(target));
        }
        Ok(())
    }

    fn build(&mut self, target: &str, script: &LuaScriptBridge) -> Result<PathBuf, BuildError> {
        if let Some((path, _)) = self.completed.get(target) {
            return Ok(path.clone());
        }

        if self.active_stack.iter().any(|t| t == target) {
            let mut cycle = self.active_stack.clone();
            cycle.push(target.to_string());
            return Err(BuildError::DependencyCycle(cycle));
        }

        self.get_or_create_recipe(target)?;

        // A top-level call (nothing else on the active stack) starts a new
        // build invocation: forget whichever target failed last time so it
        // doesn't leak into this one's error.
        if self.active_stack.is_empty() {
            self.first_failed_target = None;
        }

        self.active_stack.push(target.to_string());
        let result = self.execute(target, script);
        let _ = self.active_stack.pop();

        result.map_err(|source| BuildError::BuildFailed {
            target: self.first_failed_target.clone().unwrap_or_else(|| target.to_string()),
            source: Box::new(source),
        })
    }

    fn execute(&mut self, target: &str, script: &LuaScriptBridge) -> Result<PathBuf, BuildError> {
        let request_key = self.request_key_for(target);

        if !self.config.cache_disabled {
            if let Some(path) = self.try_cache_hit(target, request_key)? {
                return Ok(path);
            }
        }

        let output_dir = self.output_dir_for(target);
        std::fs::create_dir_all(&output_dir)?;
        let temp_dir = self.store.tmp_dir(target)?;

        {
            let recipe = self.recipes.get_mut(target).expect("recipe created above");
            recipe.state = RecipeState::Running;
            recipe.request_key = Some(request_key);
            recipe.output_dir = Some(output_dir.clone());
            recipe.temp_dir = Some(temp_dir.clone());
            recipe.start_time = Some(Instant::now());
        }

        let function_name = self.targets.lookup(target).map_err(BuildError::from)?.function_name.clone();

        let wall_start = Instant::now();
        let run_result = {
            let mut adapter = HostAdapter {
                state: self,
                script,
                target: target.to_string(),
            };
            script.call_target(&function_name, target, &output_dir, &temp_dir, &mut adapter)
        };
        let wall_ms = u64::try_from(wall_start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match run_result {
            Ok(()) => self.on_recipe_complete(target, &output_dir, wall_ms),
            Err(source) => {
                // A recipe suspended on a failing `depend_on` is left in
                // `Suspended` rather than `Failed` by the host adapter, so
                // only a `Running` recipe here failed on its own account —
                // one already `Suspended` is just relaying a dependency's
                // failure and must stay non-terminal.
                if let Some(recipe) = self.recipes.get_mut(target) {
                    if recipe.state != RecipeState::Suspended {
                        recipe.state = RecipeState::Failed;
                        if self.first_failed_target.is_none() {
                            self.first_failed_target = Some(target.to_string());
                        }
                    }
                }
                Err(BuildError::ScriptExecFailure {
                    target: target.to_string(),
                    source,
                })
            }
        }
    }

    fn try_cache_hit(&mut self, target: &str, request_key: Hash) -> Result<Option<PathBuf>, BuildError> {
        let trace = match Trace::load(request_key, &self.store) {
            Ok(t) => t,
            Err(_) => return Ok(None),
        };
        if !trace.validate() {
            return Ok(None);
        }

        let output_dir = self.output_dir_for(target);
        std::fs::create_dir_all(&output_dir)?;
        if self.store.object_exists(trace.output_tree_hash) {
            let object_path = self.store.object_path(trace.output_tree_hash)?;
            if object_path.is_dir() {
                restore_tree(&object_path, &output_dir)?;
            }
        }

        if let Some(recipe) = self.recipes.get_mut(target) {
            recipe.state = RecipeState::Complete;
            recipe.request_key = Some(request_key);
            recipe.output_dir = Some(output_dir.clone());
        }
        let _ = self.completed.insert(target.to_string(), (output_dir.clone(), trace.output_tree_hash));
        tracing::info!(target, "cache hit");
        Ok(Some(output_dir))
    }

    fn on_recipe_complete(&mut self, target: &str, output_dir: &Path, wall_ms: u64) -> Result<PathBuf, BuildError> {
        let output_tree_hash = hash_tree(output_dir)?;
        let _ = self.store.put_object_tree(output_dir)?;

        let (request_key, declared_deps) = {
            let recipe = self.recipes.get_mut(target).expect("recipe created above");
            recipe.state = RecipeState::Complete;
            (recipe.request_key.expect("set before execution"), recipe.declared_deps.clone())
        };

        let mut trace = Trace::create(request_key);
        for dep_path in &declared_deps {
            let hash = if dep_path.is_dir() {
                hash_tree(dep_path)?
            } else {
                rebuild_hash::hash_file(dep_path)?
            };
            trace.add_dependency(dep_path.clone(), hash);
        }
        trace.output_tree_hash = output_tree_hash;
        trace.wall_ms = wall_ms;
        trace.cpu_ms = wall_ms;
        trace.save(&self.store)?;

        let _ = self
            .completed
            .insert(target.to_string(), (output_dir.to_path_buf(), output_tree_hash));
        tracing::info!(target, deps = declared_deps.len(), "recipe completed");
        Ok(output_dir.to_path_buf())
    }

    fn output_dir_for(&self, target: &str) -> PathBuf {
        self.store
            .root()
            .parent()
            .unwrap_or_else(|| self.store.root())
            .join("outputs")
            .join(sanitize(target))
    }

    /// Hashes just the source text of the Lua function registered for
    /// `target`, so that editing one target's recipe does not invalidate
    /// every other target's cache in the same build file. Falls back to
    /// hashing the whole file when the function's extent can't be found
    /// (an unexpected script shape) — logged, since that fallback trades
    /// away per-recipe precision.
    fn recipe_code_hash(&self, target: &str) -> Hash {
        let Ok(entry) = self.targets.lookup(target) else {
            return self.script_hash;
        };
        match crate::codehash::function_span(&self.script_source, &entry.function_name) {
            Some(span) => hash_bytes(span.as_bytes()),
            None => {
                tracing::warn!(target, function = %entry.function_name, "could not isolate function source; falling back to whole-file hash");
                self.script_hash
            }
        }
    }

    fn request_key_for(&self, target: &str) -> Hash {
        let recipe_code_hash = self.recipe_code_hash(target).combine(hash_bytes(target.as_bytes()));
        let mut acc = recipe_code_hash;

        let mut dep_strings: Vec<String> = self
            .recipes
            .get(target)
            .map(|r| r.declared_deps.iter().map(|p| p.to_string_lossy().into_owned()).collect())
            .unwrap_or_default();
        dep_strings.sort();
        for d in &dep_strings {
            acc = acc.combine(hash_bytes(d.as_bytes()));
        }

        let mut tool_hashes: Vec<Hash> = self
            .recipes
            .get(target)
            .map(|r| r.tool_hashes.clone())
            .unwrap_or_default();
        tool_hashes.sort();
        for h in &tool_hashes {
            acc = acc.combine(*h);
        }

        acc.combine(self.config.hash())
    }

    fn record_path_dep(&mut self, from: &str, path: &Path) {
        if let Some(recipe) = self.recipes.get_mut(from) {
            recipe.record_dep(path.to_path_buf());
        }
    }

    fn graph_node(&mut self, target: &str) -> NodeId {
        if let Some(id) = self.graph_nodes.get(target) {
            return *id;
        }
        let id = self.dep_graph.add_node(target.to_string());
        let _ = self.graph_nodes.insert(target.to_string(), id);
        id
    }

    /// Records that `dependency` must run before `dependent`, failing if
    /// doing so would close a cycle the active-recursion check missed.
    fn record_edge(&mut self, dependency: &str, dependent: &str) -> Result<(), BuildError> {
        let dep_id = self.graph_node(dependency);
        let dependent_id = self.graph_node(dependent);
        match self.dep_graph.add_edge(dep_id, dependent_id, ()) {
            Ok(()) => Ok(()),
            Err(rebuild_graph::GraphError::CycleDetected(_)) => Err(BuildError::DependencyCycle(vec![
                dependency.to_string(),
                dependent.to_string(),
            ])),
            Err(other) => unreachable!("dependency graph rejected a freshly created edge: {other}"),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn restore_tree(src: &Path, dest: &Path) -> Result<(), BuildError> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&to)?;
            restore_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Bridges a recipe's script calls back into the owning scheduler state.
/// Holds a shared reference to the interpreter alongside its exclusive
/// reference to the rest of the scheduler's state, so `depend_on` can call
/// straight back into [`SchedulerState::build`] (and, through it, `mlua`
/// again) without conflicting with the borrow `call_target` holds on
/// itself — `mlua::Lua`'s methods take `&self` for exactly this reason.
struct HostAdapter<'a> {
    state: &'a mut SchedulerState,
    script: &'a LuaScriptBridge,
    target: String,
}

impl<'a> HostContext for HostAdapter<'a> {
    fn depend_on(&mut self, target: &str) -> Result<PathBuf, HostError> {
        self.state.record_edge(target, &self.target).map_err(HostError::new)?;

        let prior_state = self.state.recipes.get(&self.target).map(|r| r.state);
        if let Some(recipe) = self.state.recipes.get_mut(&self.target) {
            recipe.state = RecipeState::Suspended;
        }

        let result = self.state.build(target, self.script);

        // Only restore this recipe's prior state when the dependency
        // resolved: leaving it `Suspended` on failure is what tells
        // `execute`'s error branch, at every caller up the recursion chain,
        // that the failure belongs to `target`, not to us.
        match result {
            Ok(path) => {
                if let (Some(recipe), Some(prior)) = (self.state.recipes.get_mut(&self.target), prior_state) {
                    recipe.state = prior;
                }
                self.state.record_path_dep(&self.target, &path);
                Ok(path)
            }
            Err(source) => Err(HostError::new(source)),
        }
    }

    fn depend_on_all(&mut self, targets: &[String]) -> Result<Vec<PathBuf>, HostError> {
        targets.iter().map(|t| self.depend_on(t)).collect()
    }

    fn sys(
        &mut self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> Result<SysResult, HostError> {
        if argv.is_empty() {
            return Err(HostError::new("sys() called with empty argument vector"));
        }
        let default_cwd = self.state.recipes.get(&self.target).and_then(|r| r.temp_dir.clone());
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        if let Some(dir) = cwd.map(Path::to_path_buf).or(default_cwd) {
            command.current_dir(dir);
        }
        for (k, v) in env {
            command.env(k, v);
        }
        let output = command.output().map_err(HostError::new)?;
        Ok(SysResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn register_dep(&mut self, path: &Path) -> Result<(), HostError> {
        self.state.record_path_dep(&self.target, path);
        Ok(())
    }

    fn glob(&mut self, pattern: &str) -> Result<Vec<PathBuf>, HostError> {
        let root = std::env::current_dir().map_err(HostError::new)?;
        Ok(glob::expand(&root, pattern))
    }

    fn deptool(&mut self, name: &str) -> Result<ToolHandle, HostError> {
        let entry = self.state.tools.load(name).map_err(HostError::new)?;
        let binary_hash = entry.binary_hash;
        let module_hash = entry.module_hash;
        let handle = ToolHandle {
            binary_path: entry.binary_path.to_string_lossy().into_owned(),
            module_path: entry.module_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
        };

        if let Some(recipe) = self.state.recipes.get_mut(&self.target) {
            recipe.record_tool_hash(binary_hash);
            if module_hash != Hash::ZERO {
                recipe.record_tool_hash(module_hash);
            }
        }

        Ok(handle)
    }

    fn register_target(&mut self, name: &str, function_name: &str) -> Result<(), HostError> {
        self.state.targets.register(name, function_name);
        Ok(())
    }

    fn log_info(&mut self, msg: &str) {
        tracing::info!(target = %self.target, "{msg}");
    }

    fn log_debug(&mut self, msg: &str) {
        tracing::debug!(target = %self.target, "{msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scheduler_in(dir: &Path) -> Scheduler {
        let config = Config {
            store_root: Some(dir.join("store")),
            ..Config::new()
        };
        Scheduler::new(config).unwrap()
    }

    fn write_build_file(dir: &Path, source: &str) -> PathBuf {
        let path = dir.join("BUILD.lua");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(source.as_bytes()).unwrap();
        path
    }

    #[test]
    fn clean_build_two_leaf_dag() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_in(dir.path());
        let build_path = write_build_file(
            dir.path(),
            r#"
            register_target("lib_a", "build_lib_a")
            register_target("lib_b", "build_lib_b")
            register_target("app", "build_app")

            function build_lib_a()
                sys({"sh", "-c", "printf a > " .. OUTPUT_DIR .. "/out.txt"})
            end

            function build_lib_b()
                sys({"sh", "-c", "printf b > " .. OUTPUT_DIR .. "/out.txt"})
            end

            function build_app()
                local a = depend_on("lib_a")
                local b = depend_on("lib_b")
                sys({"sh", "-c", "cat " .. a .. "/out.txt " .. b .. "/out.txt > " .. OUTPUT_DIR .. "/out.txt"})
            end
            "#,
        );
        scheduler.load_build_file(&build_path).unwrap();

        let app_dir = scheduler.build("app").unwrap();
        let content = std::fs::read_to_string(app_dir.join("out.txt")).unwrap();
        assert_eq!(content, "ab");
        assert_eq!(scheduler.recipe_state("lib_a"), Some(RecipeState::Complete));
        assert_eq!(scheduler.recipe_state("lib_b"), Some(RecipeState::Complete));
    }

    #[test]
    fn target_not_found_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_in(dir.path());
        let build_path = write_build_file(
            dir.path(),
            r#"
            register_target("known", "build_known")
            function build_known() end
            "#,
        );
        scheduler.load_build_file(&build_path).unwrap();

        let err = scheduler.build("missing").unwrap_err();
        assert!(matches!(err, BuildError::TargetNotFound(t) if t == "missing"));
    }

    #[test]
    fn diamond_dependency_builds_shared_leaf_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_in(dir.path());
        let build_path = write_build_file(
            dir.path(),
            r#"
            register_target("leaf", "build_leaf")
            register_target("a", "build_a")
            register_target("b", "build_b")
            register_target("top", "build_top")

            function build_leaf()
                sys({"sh", "-c", "printf x >> " .. OUTPUT_DIR .. "/count.txt"})
            end

            function build_a()
                depend_on("leaf")
            end

            function build_b()
                depend_on("leaf")
            end

            function build_top()
                depend_on("a")
                depend_on("b")
            end
            "#,
        );
        scheduler.load_build_file(&build_path).unwrap();

        scheduler.build("top").unwrap();
        let leaf_dir = scheduler.build("leaf").unwrap();
        let count = std::fs::read_to_string(leaf_dir.join("count.txt")).unwrap();
        assert_eq!(count, "x", "leaf recipe must run exactly once across the diamond");
    }

    #[test]
    fn failure_in_one_branch_does_not_corrupt_sibling_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_in(dir.path());
        let build_path = write_build_file(
            dir.path(),
            r#"
            register_target("good", "build_good")
            register_target("bad", "build_bad")

            function build_good()
                sys({"sh", "-c", "printf ok > " .. OUTPUT_DIR .. "/out.txt"})
            end

            function build_bad()
                error("boom")
            end
            "#,
        );
        scheduler.load_build_file(&build_path).unwrap();

        let good_dir = scheduler.build("good").unwrap();
        assert_eq!(std::fs::read_to_string(good_dir.join("out.txt")).unwrap(), "ok");

        let err = scheduler.build("bad").unwrap_err();
        assert!(matches!(err, BuildError::BuildFailed { ref target, .. } if target == "bad"));
        assert_eq!(scheduler.recipe_state("bad"), Some(RecipeState::Failed));

        let good_dir_again = scheduler.build("good").unwrap();
        assert_eq!(good_dir_again, good_dir);
        assert_eq!(std::fs::read_to_string(good_dir.join("out.txt")).unwrap(), "ok");
    }

    #[test]
    fn dependent_of_a_failing_target_is_left_non_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_in(dir.path());
        let build_path = write_build_file(
            dir.path(),
            r#"
            register_target("p", "build_p")
            register_target("q", "build_q")
            register_target("x", "build_x")

            function build_p()
                sys({"sh", "-c", "printf ok > " .. OUTPUT_DIR .. "/out.txt"})
            end

            function build_q()
                error("boom")
            end

            function build_x()
                depend_on("p")
                depend_on("q")
            end
            "#,
        );
        scheduler.load_build_file(&build_path).unwrap();

        let err = scheduler.build("x").unwrap_err();
        assert!(
            matches!(err, BuildError::BuildFailed { ref target, .. } if target == "q"),
            "top-level error must name the dependency that actually failed, not its caller: {err}"
        );
        assert_eq!(scheduler.recipe_state("p"), Some(RecipeState::Complete));
        assert_eq!(scheduler.recipe_state("q"), Some(RecipeState::Failed));
        assert_ne!(
            scheduler.recipe_state("x"),
            Some(RecipeState::Complete),
            "x never finished its script"
        );
        assert_ne!(
            scheduler.recipe_state("x"),
            Some(RecipeState::Failed),
            "x's own script body never threw; only the dependency it called did"
        );
    }

    #[test]
    fn no_op_rebuild_is_a_pure_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let build_path = write_build_file(
            dir.path(),
            r#"
            register_target("out", "build_out")
            function build_out()
                sys({"sh", "-c", "printf built >> " .. OUTPUT_DIR .. "/marker.txt"})
            end
            "#,
        );

        let mut first = scheduler_in(dir.path());
        first.load_build_file(&build_path).unwrap();
        let out_dir = first.build("out").unwrap();
        let marker = out_dir.join("marker.txt");
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "built");

        let mut second = scheduler_in(dir.path());
        second.load_build_file(&build_path).unwrap();
        let out_dir2 = second.build("out").unwrap();
        assert_eq!(out_dir2, out_dir);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "built");
    }
}
