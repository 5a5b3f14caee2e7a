//! Phase orchestration.
//!
//! One `PhaseRunner` invocation executes a phase's stages in fixed order,
//! short-circuiting on the first failure, then hands control to the
//! wrapped original command: waited on as a child for the assemble phase,
//! `exec`ed over this process for the run phase.

use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::envfile::{self, EnvironmentSet};
use crate::error::HookError;
use crate::exec::{self, ExecutionResult};

use super::{HookFile, Phase, Stage, StageKind};

pub struct PhaseRunner {
    hooks_dir: PathBuf,
    strict: bool,
    base_env: Option<EnvironmentSet>,
}

impl PhaseRunner {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            strict: false,
            base_env: None,
        }
    }

    /// Treat a present-but-non-executable out-of-process hook as fatal
    /// instead of warning and skipping.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override the environment the phase starts from. Defaults to a
    /// snapshot of this process's environment taken at phase start.
    pub fn base_env(mut self, env: EnvironmentSet) -> Self {
        self.base_env = Some(env);
        self
    }

    /// Run the assemble phase around `original`, waiting for it as a
    /// child. The runner stays alive afterwards; the returned result is
    /// the original command's (successful) status.
    pub fn run_assemble(
        &self,
        original: &Path,
        args: &[String],
    ) -> Result<ExecutionResult, HookError> {
        let mut env = self.phase_env();
        self.run_stages(Phase::Assemble, &mut env)?;

        debug!(command = %original.display(), "running original assemble command");
        let result =
            exec::run_command(original, args, &env).map_err(|source| {
                HookError::OriginalUnavailable {
                    path: original.to_path_buf(),
                    source,
                }
            })?;
        if !result.success() {
            return Err(HookError::OriginalFailed { result });
        }
        Ok(result)
    }

    /// Run the deploy phase, then replace this process with `original`.
    /// Returns only on failure; on success the original command has taken
    /// over and its exit is no longer observable from here.
    pub fn run_deploy(&self, original: &Path, args: &[String]) -> Result<Infallible, HookError> {
        let mut env = self.phase_env();
        self.run_stages(Phase::Run, &mut env)?;

        let source = exec::transfer(original, args, &env);
        Err(HookError::TransferFailed {
            path: original.to_path_buf(),
            source,
        })
    }

    /// Evaluate only the phase's inline stage and return the assignments
    /// it made, with final values. This is what lets an interactively
    /// attached session reproduce the environment of the supervised run.
    pub fn env_exports(&self, phase: Phase) -> Result<Vec<(String, String)>, HookError> {
        let mut env = self.phase_env();
        let stage = phase.inline_stage();
        let hook = HookFile::resolve(&self.hooks_dir, stage);
        if !hook.exists {
            return Ok(Vec::new());
        }
        let assigned = Self::apply_inline(&hook, &mut env)?;
        Ok(assigned
            .into_iter()
            .map(|name| {
                let value = env.get(&name).unwrap_or("").to_string();
                (name, value)
            })
            .collect())
    }

    fn phase_env(&self) -> EnvironmentSet {
        self.base_env
            .clone()
            .unwrap_or_else(EnvironmentSet::from_process_env)
    }

    fn run_stages(&self, phase: Phase, env: &mut EnvironmentSet) -> Result<(), HookError> {
        for &stage in phase.stages() {
            // deploy_env feeds interactively attached shells as well as the
            // supervised run; it must stay silent on every non-fatal path.
            let silent = stage == Stage::DeployEnv;
            let hook = HookFile::resolve(&self.hooks_dir, stage);
            if !hook.exists {
                if !silent {
                    debug!(hook = stage.file_name(), "hook not present, skipping");
                }
                continue;
            }
            match stage.kind() {
                StageKind::InlineEnv => {
                    let assigned = Self::apply_inline(&hook, env)?;
                    if !silent {
                        debug!(
                            hook = stage.file_name(),
                            assignments = assigned.len(),
                            "merged inline environment"
                        );
                    }
                }
                StageKind::OutOfProcess => {
                    if !hook.executable {
                        if self.strict {
                            return Err(HookError::NotExecutable {
                                stage,
                                path: hook.path,
                            });
                        }
                        warn!(
                            hook = stage.file_name(),
                            path = %hook.path.display(),
                            "hook is present but not executable, skipping; set the executable bit to enable it"
                        );
                        continue;
                    }
                    debug!(hook = stage.file_name(), "running hook");
                    let result = exec::run_command(&hook.path, &[], env).map_err(|source| {
                        HookError::SpawnHook {
                            stage,
                            path: hook.path.clone(),
                            source,
                        }
                    })?;
                    if !result.success() {
                        return Err(HookError::HookFailed { stage, result });
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_inline(hook: &HookFile, env: &mut EnvironmentSet) -> Result<Vec<String>, HookError> {
        let content = fs::read_to_string(&hook.path).map_err(|source| HookError::ReadHook {
            stage: hook.stage,
            path: hook.path.clone(),
            source,
        })?;
        envfile::apply(&content, env).map_err(|source| HookError::EnvEval {
            stage: hook.stage,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_hook(dir: &Path, name: &str, body: &str) {
        write_file(dir, name, &format!("#!/bin/sh\n{body}\n"), true);
    }

    fn write_env_hook(dir: &Path, name: &str, content: &str) {
        write_file(dir, name, content, false);
    }

    fn write_file(dir: &Path, name: &str, content: &str, executable: bool) {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        }
    }

    /// Minimal base environment: hooks run with `env_clear`, so they need
    /// an explicit PATH to find `sh` builtins' external helpers.
    fn base_env() -> EnvironmentSet {
        let mut env = EnvironmentSet::new();
        env.set("PATH", std::env::var("PATH").unwrap_or_default());
        env
    }

    fn original_script(dir: &Path, marker: &str) -> PathBuf {
        write_hook(dir, "assemble.orig", &format!("touch {marker}\nexit 0"));
        dir.join("assemble.orig")
    }

    #[cfg(unix)]
    #[test]
    fn empty_hook_dir_runs_original_with_inherited_env() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let out = tmp.path().join("out");
        write_hook(
            tmp.path(),
            "assemble.orig",
            &format!("printf '%s' \"$MARKER\" > {}", out.display()),
        );

        let mut env = base_env();
        env.set("MARKER", "inherited");
        let result = PhaseRunner::new(&hooks)
            .base_env(env)
            .run_assemble(&tmp.path().join("assemble.orig"), &[])
            .unwrap();

        assert!(result.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "inherited");
    }

    #[cfg(unix)]
    #[test]
    fn build_env_assignments_reach_build_and_original() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let build_out = tmp.path().join("build_out");
        let orig_out = tmp.path().join("orig_out");

        write_env_hook(&hooks, "build_env", "FOO=bar\n");
        write_hook(
            &hooks,
            "build",
            &format!("printf '%s' \"$FOO\" > {}", build_out.display()),
        );
        write_hook(
            tmp.path(),
            "assemble.orig",
            &format!("printf '%s' \"$FOO\" > {}", orig_out.display()),
        );

        PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_assemble(&tmp.path().join("assemble.orig"), &[])
            .unwrap();

        assert_eq!(fs::read_to_string(&build_out).unwrap(), "bar");
        assert_eq!(fs::read_to_string(&orig_out).unwrap(), "bar");
    }

    #[cfg(unix)]
    #[test]
    fn pre_build_failure_aborts_phase_with_its_code() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let build_marker = tmp.path().join("build_ran");
        let orig_marker = tmp.path().join("orig_ran");

        write_hook(&hooks, "pre_build", "exit 3");
        write_hook(&hooks, "build", &format!("touch {}", build_marker.display()));
        let original = original_script(tmp.path(), &orig_marker.display().to_string());

        let err = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_assemble(&original, &[])
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::HookFailed {
                stage: Stage::PreBuild,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 3);
        assert!(!build_marker.exists(), "build must not run after pre_build fails");
        assert!(!orig_marker.exists(), "original must not run after pre_build fails");
    }

    #[cfg(unix)]
    #[test]
    fn hook_environment_mutations_stay_in_the_child() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let orig_out = tmp.path().join("orig_out");

        // pre_build exports a variable into its own (child) environment
        write_hook(&hooks, "pre_build", "LEAK=1\nexport LEAK");
        write_hook(
            tmp.path(),
            "assemble.orig",
            &format!("printf '%s' \"${{LEAK:-none}}\" > {}", orig_out.display()),
        );

        PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_assemble(&tmp.path().join("assemble.orig"), &[])
            .unwrap();

        assert_eq!(fs::read_to_string(&orig_out).unwrap(), "none");
    }

    #[cfg(unix)]
    #[test]
    fn malformed_build_env_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let orig_marker = tmp.path().join("orig_ran");

        write_env_hook(&hooks, "build_env", "this is not an assignment\n");
        let original = original_script(tmp.path(), &orig_marker.display().to_string());

        let err = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_assemble(&original, &[])
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::EnvEval {
                stage: Stage::BuildEnv,
                ..
            }
        ));
        assert!(!orig_marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_hook_skipped_by_default() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let build_marker = tmp.path().join("build_ran");
        let orig_marker = tmp.path().join("orig_ran");

        write_file(
            &hooks,
            "build",
            &format!("#!/bin/sh\ntouch {}\n", build_marker.display()),
            false,
        );
        let original = original_script(tmp.path(), &orig_marker.display().to_string());

        PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_assemble(&original, &[])
            .unwrap();

        assert!(!build_marker.exists(), "non-executable hook must be skipped");
        assert!(orig_marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_hook_fatal_in_strict_mode() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        let orig_marker = tmp.path().join("orig_ran");

        write_file(&hooks, "build", "#!/bin/sh\n", false);
        let original = original_script(tmp.path(), &orig_marker.display().to_string());

        let err = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .strict(true)
            .run_assemble(&original, &[])
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::NotExecutable {
                stage: Stage::Build,
                ..
            }
        ));
        assert!(!orig_marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn original_failure_propagates_its_code() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        write_hook(tmp.path(), "assemble.orig", "exit 9");

        let err = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_assemble(&tmp.path().join("assemble.orig"), &[])
            .unwrap_err();

        assert!(matches!(err, HookError::OriginalFailed { .. }));
        assert_eq!(err.exit_code(), 9);
    }

    #[cfg(unix)]
    #[test]
    fn assemble_phase_is_idempotent_with_noop_hooks() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        write_env_hook(&hooks, "build_env", "A=${A:-1}\n");
        write_hook(tmp.path(), "assemble.orig", "exit 0");

        let runner = PhaseRunner::new(&hooks).base_env(base_env());
        let original = tmp.path().join("assemble.orig");
        let first = runner.run_assemble(&original, &[]).unwrap();
        let second = runner.run_assemble(&original, &[]).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn deploy_hook_failure_prevents_transfer() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        write_hook(&hooks, "deploy", "exit 5");
        write_hook(tmp.path(), "run.orig", "exit 0");

        let err = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_deploy(&tmp.path().join("run.orig"), &[])
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::HookFailed {
                stage: Stage::Deploy,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn missing_run_original_reports_transfer_failure() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();

        let err = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .run_deploy(&tmp.path().join("missing.orig"), &[])
            .unwrap_err();

        assert!(matches!(err, HookError::TransferFailed { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn env_exports_reports_only_inline_assignments() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        write_env_hook(&hooks, "deploy_env", "PORT=${PORT:-8080}\nMODE=prod\n");

        let exports = PhaseRunner::new(&hooks)
            .base_env(base_env())
            .env_exports(Phase::Run)
            .unwrap();

        assert_eq!(
            exports,
            vec![
                ("PORT".to_string(), "8080".to_string()),
                ("MODE".to_string(), "prod".to_string()),
            ]
        );
    }

    #[test]
    fn env_exports_respects_preset_values() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join("hooks");
        fs::create_dir(&hooks).unwrap();
        write_env_hook(&hooks, "deploy_env", "PORT=${PORT:-8080}\n");

        let mut env = base_env();
        env.set("PORT", "9000");
        let exports = PhaseRunner::new(&hooks)
            .base_env(env)
            .env_exports(Phase::Run)
            .unwrap();

        assert_eq!(exports, vec![("PORT".to_string(), "9000".to_string())]);
    }

    #[test]
    fn env_exports_empty_when_hook_absent() {
        let tmp = TempDir::new().unwrap();
        let exports = PhaseRunner::new(tmp.path())
            .base_env(base_env())
            .env_exports(Phase::Run)
            .unwrap();
        assert!(exports.is_empty());
    }
}
