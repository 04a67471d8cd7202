//! `rebuild` — command-line entry point for the build engine.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use rebuild_core::{BuildError, Config};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Conventional build-definition file name, located by walking upward
/// from the current directory.
const BUILD_FILE_NAME: &str = "BUILD.lua";

const EXIT_OK: u8 = 0;
const EXIT_BUILD_FAILURE: u8 = 1;
const EXIT_USAGE_ERROR: u8 = 2;
const EXIT_INTERNAL_ERROR: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(CliError::Usage(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_USAGE_ERROR)
        }
        Err(CliError::Build(e)) => {
            eprintln!("{e}");
            ExitCode::from(EXIT_BUILD_FAILURE)
        }
        Err(CliError::Internal(e)) => {
            eprintln!("internal error: {e}");
            ExitCode::from(EXIT_INTERNAL_ERROR)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "rebuild=info",
        1 => "rebuild=debug",
        _ => "rebuild=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

enum CliError {
    Usage(String),
    Build(BuildError),
    Internal(Box<dyn std::error::Error>),
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::Build(e)
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.jobs == 0 {
        return Err(CliError::Usage("--jobs must be at least 1".into()));
    }

    let config = Config {
        store_root: cli.store_root.clone(),
        jobs: cli.jobs,
        cache_disabled: cli.no_cache,
        ..Config::new()
    };

    if let Some(Commands::Clean { all }) = &cli.command {
        commands::clean::run(config, *all)?;
        return Ok(());
    }

    let cwd = std::env::current_dir().map_err(|e| CliError::Internal(Box::new(e)))?;
    let build_file = find_build_file(&cwd).ok_or_else(|| {
        CliError::Usage(format!(
            "no build definition file found; looked for {BUILD_FILE_NAME} walking up from {}",
            cwd.display()
        ))
    })?;

    match &cli.command {
        Some(Commands::Build { target }) => commands::build::run(config, &build_file, target)?,
        Some(Commands::Query { target }) => commands::query::run(config, &build_file, target)?,
        Some(Commands::Clean { .. }) => unreachable!("handled above"),
        None => {
            let target = cli.target.as_deref().ok_or_else(|| {
                CliError::Usage("no target given; pass a target, or use build/query/clean".into())
            })?;
            commands::build::run(config, &build_file, target)?
        }
    }
    Ok(())
}

/// Walks upward from `start` looking for [`BUILD_FILE_NAME`].
fn find_build_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    while let Some(d) = dir {
        let candidate = d.join(BUILD_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    None
}
