//! The stage model: which hooks exist, what order they run in, and how
//! their on-disk artifacts are resolved.

mod runner;

pub use runner::PhaseRunner;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The two lifecycle points at which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Image build: `pre_build` → `build_env` → `build` → original assemble.
    Assemble,
    /// Container start: `deploy_env` → `deploy` → exec original run.
    Run,
}

impl Phase {
    /// Stages of this phase, in execution order. The order is fixed and
    /// total; later stages depend on the environment produced by earlier
    /// ones.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Phase::Assemble => &[Stage::PreBuild, Stage::BuildEnv, Stage::Build],
            Phase::Run => &[Stage::DeployEnv, Stage::Deploy],
        }
    }

    /// The phase's single inline (environment-mutating) stage.
    pub fn inline_stage(self) -> Stage {
        match self {
            Phase::Assemble => Stage::BuildEnv,
            Phase::Run => Stage::DeployEnv,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Assemble => "assemble",
            Phase::Run => "run",
        }
    }
}

/// One named hook point within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PreBuild,
    BuildEnv,
    Build,
    DeployEnv,
    Deploy,
}

/// How a stage executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Evaluated in-process against the runner's environment; never forks.
    InlineEnv,
    /// Run as a child process that inherits the environment by value.
    OutOfProcess,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::PreBuild,
        Stage::BuildEnv,
        Stage::Build,
        Stage::DeployEnv,
        Stage::Deploy,
    ];

    /// File name of this stage's hook inside the hook directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Stage::PreBuild => "pre_build",
            Stage::BuildEnv => "build_env",
            Stage::Build => "build",
            Stage::DeployEnv => "deploy_env",
            Stage::Deploy => "deploy",
        }
    }

    pub fn kind(self) -> StageKind {
        match self {
            Stage::BuildEnv | Stage::DeployEnv => StageKind::InlineEnv,
            Stage::PreBuild | Stage::Build | Stage::Deploy => StageKind::OutOfProcess,
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            Stage::PreBuild | Stage::BuildEnv | Stage::Build => Phase::Assemble,
            Stage::DeployEnv | Stage::Deploy => Phase::Run,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Resolved on-disk artifact for a stage. The executable bit is only
/// meaningful for out-of-process stages; inline hooks are plain text.
#[derive(Debug, Clone)]
pub struct HookFile {
    pub stage: Stage,
    pub path: PathBuf,
    pub exists: bool,
    pub executable: bool,
}

impl HookFile {
    /// Inspect `<hooks_dir>/<stage file name>`. Symlinks are followed; a
    /// dangling symlink counts as absent.
    pub fn resolve(hooks_dir: &Path, stage: Stage) -> Self {
        let path = hooks_dir.join(stage.file_name());
        match fs::metadata(&path) {
            Ok(meta) => {
                #[cfg(unix)]
                let executable = {
                    use std::os::unix::fs::PermissionsExt;
                    meta.permissions().mode() & 0o111 != 0
                };
                #[cfg(not(unix))]
                let executable = meta.is_file();

                Self {
                    stage,
                    path,
                    exists: true,
                    executable,
                }
            }
            Err(_) => Self {
                stage,
                path,
                exists: false,
                executable: false,
            },
        }
    }
}
