//! Argument parsing for the `rebuild` command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A constructive-trace incremental build engine.
#[derive(Parser)]
#[command(name = "rebuild")]
#[command(about = "Constructive-trace incremental build engine")]
#[command(version)]
pub struct Cli {
    /// Overrides the content-addressed store root (defaults to
    /// `$XDG_DATA_HOME/rebuild` or `$HOME/.local/share/rebuild`).
    #[arg(long, global = true)]
    pub store_root: Option<PathBuf>,

    /// Reserved for a future parallel scheduler; accepted and validated,
    /// not yet load-bearing.
    #[arg(long, global = true, default_value_t = 1)]
    pub jobs: usize,

    /// Always treat the cache as missing; fresh traces are still written.
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Raises tracing verbosity; repeatable (`-v`, `-vv`).
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Target to build, when no subcommand is given.
    pub target: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a target.
    Build {
        /// Name of the target to build.
        target: String,
    },
    /// Print a target's registration and cache status without building it.
    Query {
        /// Name of the target to inspect.
        target: String,
    },
    /// Remove cached build state.
    Clean {
        /// Also remove persisted traces and objects, not just the scratch area.
        #[arg(long)]
        all: bool,
    },
}
