//! Child execution for out-of-process stages and the final identity
//! transfer of the run phase.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::envfile::EnvironmentSet;

/// Exit status of an out-of-process hook or wrapped command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExecutionResult {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    /// Shell-convention exit code: the child's own code, or `128 + signal`
    /// for signal deaths.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Run `program` as a child whose entire environment is `env`, inheriting
/// stdio, and wait for it synchronously. A hung child hangs the phase;
/// timeouts belong to the surrounding pipeline.
pub fn run_command(
    program: &Path,
    args: &[String],
    env: &EnvironmentSet,
) -> io::Result<ExecutionResult> {
    let status = Command::new(program)
        .args(args)
        .env_clear()
        .envs(env.iter())
        .status()?;
    Ok(ExecutionResult::from_status(status))
}

/// Replace the current process with `program`, which becomes the new
/// top-level supervised process and receives lifecycle signals directly.
/// Returns only on failure; the kernel performs the replacement atomically
/// with respect to signal delivery.
#[cfg(unix)]
pub fn transfer(program: &Path, args: &[String], env: &EnvironmentSet) -> io::Error {
    use std::os::unix::process::CommandExt;
    Command::new(program)
        .args(args)
        .env_clear()
        .envs(env.iter())
        .exec()
}

/// Fallback without an `exec` primitive: run the program as a child and
/// exit with its code as soon as it finishes.
#[cfg(not(unix))]
pub fn transfer(program: &Path, args: &[String], env: &EnvironmentSet) -> io::Error {
    match run_command(program, args, env) {
        Ok(result) => std::process::exit(result.exit_code()),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn exit_code_passthrough() {
        assert_eq!(ExecutionResult::from_code(0).exit_code(), 0);
        assert_eq!(ExecutionResult::from_code(3).exit_code(), 3);
        assert!(ExecutionResult::from_code(0).success());
        assert!(!ExecutionResult::from_code(3).success());
    }

    #[test]
    fn display_formats_code() {
        assert_eq!(ExecutionResult::from_code(7).to_string(), "exit code 7");
    }

    #[cfg(unix)]
    #[test]
    fn run_command_captures_exit_code() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(&tmp, "fail", "exit 4");
        let result = run_command(&script, &[], &EnvironmentSet::new()).unwrap();
        assert_eq!(result.exit_code(), 4);
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[test]
    fn run_command_passes_exactly_the_given_environment() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let script = write_script(
            &tmp,
            "dump",
            &format!("printf '%s' \"$MARKER\" > {}", out.display()),
        );
        let mut env = EnvironmentSet::new();
        env.set("PATH", std::env::var("PATH").unwrap_or_default());
        env.set("MARKER", "present");
        run_command(&script, &[], &env).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "present");
    }

    #[cfg(unix)]
    #[test]
    fn run_command_reports_signal_death() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(&tmp, "die", "kill -9 $$");
        let result = run_command(&script, &[], &EnvironmentSet::new()).unwrap();
        assert_eq!(result.signal(), Some(9));
        assert_eq!(result.exit_code(), 137);
    }

    #[test]
    fn run_command_missing_program_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(run_command(&missing, &[], &EnvironmentSet::new()).is_err());
    }
}
