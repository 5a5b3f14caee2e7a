#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::uninlined_format_args
)]

//! Staged lifecycle hooks around wrapped build/deploy commands.
//!
//! A builder image renames its pre-existing `assemble`/`run` entry points
//! aside and installs `hookwrap` in front of them. The assemble phase runs
//! `pre_build` → `build_env` → `build` and then the original assemble
//! command; the run phase runs `deploy_env` → `deploy` and then *becomes*
//! the original run command via `exec`, so the application keeps receiving
//! container lifecycle signals directly.

pub mod config;
pub mod doctor;
pub mod envfile;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod util;

pub use config::Config;
pub use envfile::EnvironmentSet;
pub use error::HookError;
pub use exec::ExecutionResult;
pub use hooks::{Phase, PhaseRunner, Stage};
