//! `rebuild clean [--all]`.

use rebuild_core::{BuildError, Config, Scheduler};

pub fn run(config: Config, all: bool) -> Result<(), BuildError> {
    let scheduler = Scheduler::new(config)?;
    if all {
        scheduler.store().clean_all()?;
        println!("removed traces/, objects/, and tmp/");
    } else {
        scheduler.store().clean_tmp()?;
        println!("removed tmp/");
    }
    Ok(())
}
