//! Scheduler and recipe lifecycle for the rebuild build engine.
//!
//! This crate drives a build-definition script through its declared
//! targets, maintaining each target's [`Recipe`] state, consulting the
//! content-addressed store for cache hits, and recording fresh
//! [`rebuild_trace::Trace`]s on every recipe completion. It implements
//! [`rebuild_script::HostContext`] so a loaded script's `depend_on`,
//! `sys`, `glob`, and friends resolve back into this scheduler.

mod codehash;
mod config;
mod error;
mod glob;
mod recipe;
mod scheduler;

pub use config::Config;
pub use error::BuildError;
pub use recipe::{Recipe, RecipeState};
pub use scheduler::{Scheduler, TargetInfo};
