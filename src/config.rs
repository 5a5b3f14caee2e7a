//! Runner configuration.
//!
//! Precedence, lowest to highest: built-in defaults, optional TOML config
//! file, `HOOKWRAP_*` environment variables, CLI flags (applied by the
//! binary). Paths get `~` expansion after everything is merged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default hook directory baked into builder images.
pub const DEFAULT_HOOKS_DIR: &str = "/opt/app/hooks";
/// Where builder images park the pre-existing entry points they wrap.
const DEFAULT_ASSEMBLE_ORIGINAL: &str = "/usr/libexec/s2i/assemble.orig";
const DEFAULT_RUN_ORIGINAL: &str = "/usr/libexec/s2i/run.orig";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the `pre_build`/`build_env`/`build`/`deploy_env`/
    /// `deploy` hook files.
    pub hooks_dir: PathBuf,

    /// Abort a phase when an out-of-process hook exists without the
    /// executable bit, instead of warning and skipping it.
    pub strict: bool,

    /// The wrapped assemble entry point.
    pub assemble_original: PathBuf,

    /// The wrapped run entry point.
    pub run_original: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hooks_dir: PathBuf::from(DEFAULT_HOOKS_DIR),
            strict: false,
            assemble_original: PathBuf::from(DEFAULT_ASSEMBLE_ORIGINAL),
            run_original: PathBuf::from(DEFAULT_RUN_ORIGINAL),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides
    /// and `~` expansion.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        config.expand_paths();
        Ok(config)
    }

    /// Apply `HOOKWRAP_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("HOOKWRAP_HOOKS") {
            if !dir.is_empty() {
                self.hooks_dir = PathBuf::from(dir);
            }
        }
        if let Ok(val) = std::env::var("HOOKWRAP_STRICT") {
            self.strict = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(path) = std::env::var("HOOKWRAP_ASSEMBLE_ORIGINAL") {
            if !path.is_empty() {
                self.assemble_original = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("HOOKWRAP_RUN_ORIGINAL") {
            if !path.is_empty() {
                self.run_original = PathBuf::from(path);
            }
        }
    }

    fn expand_paths(&mut self) {
        expand_tilde(&mut self.hooks_dir);
        expand_tilde(&mut self.assemble_original);
        expand_tilde(&mut self.run_original);
    }
}

fn expand_tilde(path: &mut PathBuf) {
    let raw = path.to_string_lossy().into_owned();
    let expanded = shellexpand::tilde(&raw);
    if expanded.as_ref() != raw.as_str() {
        *path = PathBuf::from(expanded.into_owned());
    }
}
