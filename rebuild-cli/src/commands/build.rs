//! `rebuild build <target>` (also the default plain-target invocation).

use rebuild_core::{BuildError, Config, Scheduler};
use std::path::Path;

pub fn run(config: Config, build_file: &Path, target: &str) -> Result<(), BuildError> {
    let mut scheduler = Scheduler::new(config)?;
    scheduler.load_build_file(build_file)?;
    let output_dir = scheduler.build(target)?;
    println!("{target}: {}", output_dir.display());
    Ok(())
}
