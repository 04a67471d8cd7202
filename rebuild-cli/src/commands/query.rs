//! `rebuild query <target>`.

use rebuild_core::{BuildError, Config, Scheduler};
use std::path::Path;

pub fn run(config: Config, build_file: &Path, target: &str) -> Result<(), BuildError> {
    let mut scheduler = Scheduler::new(config)?;
    scheduler.load_build_file(build_file)?;
    let info = scheduler.inspect(target)?;

    println!("target:   {target}");
    println!("function: {}", info.function_name);
    println!("cached:   {}", info.cached);
    if info.declared_deps.is_empty() {
        println!("deps:     (none discovered yet this session)");
    } else {
        println!("deps:");
        for dep in &info.declared_deps {
            println!("  {}", dep.display());
        }
    }
    Ok(())
}
