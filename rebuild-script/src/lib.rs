//! Embedded scripting bridge.
//!
//! Recipes are written in an embedded scripting language and call back into
//! the host through a small set of primitives (`depend_on`, `sys`, `glob`,
//! ...). [`HostContext`] is the trait those primitives are dispatched
//! through; the scheduler crate implements it so the bridge never needs to
//! know about recipes, queues, or caching.
//!
//! The reference binding is built on an embedded Lua interpreter via
//! `mlua`. Lua has no first-class coroutine reachable from a native host
//! function, so `depend_on`/`depend_on_all` are implemented as synchronous
//! calls back into [`HostContext::depend_on`]: the native call frame blocks
//! until the dependency resolves, then returns its path to the script. For
//! a single-threaded scheduler this is externally equivalent to true fiber
//! suspension.

use mlua::{Lua, Table, Value, Variadic};
use rebuild_hash::hash_file;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Errors raised while compiling or running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The build-definition script failed to compile.
    #[error("script failed to compile: {0}")]
    CompileFailure(String),
    /// A script function raised an error while running, or a host
    /// primitive it called failed.
    #[error("script execution failed: {0}")]
    ExecFailure(String),
    /// `call_target` was asked to invoke a function the script never
    /// defined.
    #[error("target function not found: {0}")]
    FunctionNotFound(String),
}

/// An error raised from within a host primitive, to be surfaced to the
/// calling script as a Lua error and, from there, back to [`ScriptError`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    /// Wraps any displayable error as a `HostError`.
    pub fn new(msg: impl std::fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

/// Result of a `sys()` subprocess invocation.
#[derive(Debug, Clone)]
pub struct SysResult {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// A resolved tool handed back to a script by `deptool`.
#[derive(Debug, Clone)]
pub struct ToolHandle {
    /// Path to the tool's executable.
    pub binary_path: String,
    /// Path to the tool's script-side API module, if any.
    pub module_path: Option<String>,
}

/// The host-side implementation of every primitive a recipe script may
/// call. Implemented by the scheduler; the bridge only ever sees this
/// trait, never scheduler internals.
pub trait HostContext {
    /// `depend_on(target)`: ensures `target` is built, suspending the
    /// calling recipe if necessary. Returns its output directory.
    fn depend_on(&mut self, target: &str) -> Result<PathBuf, HostError>;
    /// `depend_on_all(targets)`: as [`HostContext::depend_on`] for several
    /// targets, suspending at most once.
    fn depend_on_all(&mut self, targets: &[String]) -> Result<Vec<PathBuf>, HostError>;
    /// `sys(argv, cwd, env)`: spawns a subprocess and waits for it to exit.
    fn sys(
        &mut self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> Result<SysResult, HostError>;
    /// `register_dep(path)`: records a dependency without suspending.
    fn register_dep(&mut self, path: &Path) -> Result<(), HostError>;
    /// `glob(pattern)`: expands a shell-style pattern against the filesystem.
    fn glob(&mut self, pattern: &str) -> Result<Vec<PathBuf>, HostError>;
    /// `deptool(name)`: resolves and loads a tool by name.
    fn deptool(&mut self, name: &str) -> Result<ToolHandle, HostError>;
    /// `register_target(name, function_name)`: populates the target
    /// registry while a build file loads.
    fn register_target(&mut self, name: &str, function_name: &str) -> Result<(), HostError>;
    /// `log_info(msg)`.
    fn log_info(&mut self, msg: &str);
    /// `log_debug(msg)`.
    fn log_debug(&mut self, msg: &str);
}

fn to_lua_err(e: HostError) -> mlua::Error {
    mlua::Error::RuntimeError(e.0)
}

/// The reference Script Bridge, built on an embedded Lua interpreter.
pub struct LuaScriptBridge {
    lua: Lua,
}

impl Default for LuaScriptBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LuaScriptBridge {
    /// Creates a fresh interpreter with no build file loaded.
    #[must_use]
    pub fn new() -> Self {
        Self { lua: Lua::new() }
    }

    /// Compiles and executes `source` (a build-definition file), binding
    /// host primitives against `ctx` for the duration of the load. Scripts
    /// are expected to call `register_target` at the top level while
    /// loading.
    pub fn load_build_file(&self, source: &str, ctx: &mut dyn HostContext) -> Result<(), ScriptError> {
        self.with_host_bindings(ctx, |lua| lua.load(source).set_name("build").exec())
            .map_err(|e| ScriptError::CompileFailure(e.to_string()))
    }

    /// Invokes the script function named `function_name` (as registered via
    /// `register_target`) as the recipe for `target_name`, with `TARGET`,
    /// `OUTPUT_DIR`, and `TEMP_DIR` globals set for the script to read.
    pub fn call_target(
        &self,
        function_name: &str,
        target_name: &str,
        output_dir: &Path,
        temp_dir: &Path,
        ctx: &mut dyn HostContext,
    ) -> Result<(), ScriptError> {
        let func_name = function_name.to_string();
        self.with_host_bindings(ctx, |lua| {
            let globals = lua.globals();
            globals.set("TARGET", target_name)?;
            globals.set("OUTPUT_DIR", output_dir.to_string_lossy().into_owned())?;
            globals.set("TEMP_DIR", temp_dir.to_string_lossy().into_owned())?;

            let func: mlua::Function = globals.get(func_name.as_str()).map_err(|_| {
                mlua::Error::RuntimeError(format!("target function not found: {func_name}"))
            })?;
            func.call::<_, ()>(())
        })
        .map_err(|e| {
            if e.to_string().contains("target function not found") {
                ScriptError::FunctionNotFound(function_name.to_string())
            } else {
                ScriptError::ExecFailure(e.to_string())
            }
        })
    }

    fn with_host_bindings<F, R>(&self, ctx: &mut dyn HostContext, body: F) -> mlua::Result<R>
    where
        F: FnOnce(&Lua) -> mlua::Result<R>,
    {
        let lua = &self.lua;
        let cell = RefCell::new(ctx);
        lua.scope(|scope| {
            let globals = lua.globals();

            let c = &cell;
            globals.set(
                "depend_on",
                scope.create_function_mut(move |_, target: String| {
                    let mut ctx = c.borrow_mut();
                    let path = ctx.depend_on(&target).map_err(to_lua_err)?;
                    Ok(path.to_string_lossy().into_owned())
                })?,
            )?;

            let c = &cell;
            globals.set(
                "depend_on_all",
                scope.create_function_mut(move |lua, targets: Variadic<String>| {
                    let mut ctx = c.borrow_mut();
                    let targets: Vec<String> = targets.into_iter().collect();
                    let paths = ctx.depend_on_all(&targets).map_err(to_lua_err)?;
                    let table = lua.create_table()?;
                    for (i, p) in paths.iter().enumerate() {
                        table.set(i + 1, p.to_string_lossy().into_owned())?;
                    }
                    Ok(table)
                })?,
            )?;

            let c = &cell;
            globals.set(
                "sys",
                scope.create_function_mut(move |lua, (argv, opts): (Table, Option<Table>)| {
                    let mut ctx = c.borrow_mut();
                    let argv: Vec<String> = table_to_strings(&argv)?;
                    let mut cwd: Option<PathBuf> = None;
                    let mut env: Vec<(String, String)> = Vec::new();
                    if let Some(opts) = opts {
                        if let Ok(Value::String(s)) = opts.get::<_, Value>("cwd") {
                            cwd = Some(PathBuf::from(s.to_str()?.to_string()));
                        }
                        if let Ok(env_table) = opts.get::<_, Table>("env") {
                            for pair in env_table.pairs::<String, String>() {
                                let (k, v) = pair?;
                                env.push((k, v));
                            }
                        }
                    }
                    let result = ctx.sys(&argv, cwd.as_deref(), &env).map_err(to_lua_err)?;
                    let out = lua.create_table()?;
                    out.set("exit_code", result.exit_code)?;
                    out.set("stdout", result.stdout)?;
                    out.set("stderr", result.stderr)?;
                    Ok(out)
                })?,
            )?;

            let c = &cell;
            globals.set(
                "register_dep",
                scope.create_function_mut(move |_, path: String| {
                    let mut ctx = c.borrow_mut();
                    ctx.register_dep(Path::new(&path)).map_err(to_lua_err)
                })?,
            )?;

            let c = &cell;
            globals.set(
                "glob",
                scope.create_function_mut(move |lua, pattern: String| {
                    let mut ctx = c.borrow_mut();
                    let paths = ctx.glob(&pattern).map_err(to_lua_err)?;
                    let table = lua.create_table()?;
                    for (i, p) in paths.iter().enumerate() {
                        table.set(i + 1, p.to_string_lossy().into_owned())?;
                    }
                    Ok(table)
                })?,
            )?;

            globals.set(
                "hash_file",
                scope.create_function_mut(move |_, path: String| {
                    let h = hash_file(Path::new(&path))
                        .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
                    Ok(h.hex_encode())
                })?,
            )?;

            let c = &cell;
            globals.set(
                "deptool",
                scope.create_function_mut(move |lua, name: String| {
                    let mut ctx = c.borrow_mut();
                    let handle = ctx.deptool(&name).map_err(to_lua_err)?;
                    let table = lua.create_table()?;
                    table.set("binary_path", handle.binary_path)?;
                    table.set("module_path", handle.module_path)?;
                    Ok(table)
                })?,
            )?;

            let c = &cell;
            globals.set(
                "register_target",
                scope.create_function_mut(move |_, (name, func): (String, String)| {
                    let mut ctx = c.borrow_mut();
                    ctx.register_target(&name, &func).map_err(to_lua_err)
                })?,
            )?;

            let c = &cell;
            globals.set(
                "log_info",
                scope.create_function_mut(move |_, msg: String| {
                    c.borrow_mut().log_info(&msg);
                    Ok(())
                })?,
            )?;

            let c = &cell;
            globals.set(
                "log_debug",
                scope.create_function_mut(move |_, msg: String| {
                    c.borrow_mut().log_debug(&msg);
                    Ok(())
                })?,
            )?;

            body(lua)
        })
    }
}

fn table_to_strings(table: &Table) -> mlua::Result<Vec<String>> {
    let len = table.raw_len();
    let mut out = Vec::with_capacity(len as usize);
    for i in 1..=len {
        out.push(table.get::<_, String>(i)?);
    }
    Ok(out)
}
