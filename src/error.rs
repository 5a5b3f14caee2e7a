//! Typed errors for phase execution.
//!
//! A missing hook file is not an error anywhere in this taxonomy; absent
//! stages are skipped silently by the runner.

use std::io;
use std::path::PathBuf;

use crate::envfile::EnvEvalError;
use crate::exec::ExecutionResult;
use crate::hooks::Stage;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Out-of-process hook present but missing the executable bit. Only
    /// raised under strict mode; the default policy warns and skips.
    #[error("hook '{}' at {} is present but not executable", .stage.file_name(), .path.display())]
    NotExecutable { stage: Stage, path: PathBuf },

    /// Out-of-process hook exited nonzero or died on a signal.
    #[error("hook '{}' failed with {result}", .stage.file_name())]
    HookFailed {
        stage: Stage,
        result: ExecutionResult,
    },

    /// Inline environment hook could not be evaluated.
    #[error("hook '{}' is malformed: {source}", .stage.file_name())]
    EnvEval {
        stage: Stage,
        #[source]
        source: EnvEvalError,
    },

    /// Inline environment hook exists but could not be read.
    #[error("failed to read hook '{}' at {}", .stage.file_name(), .path.display())]
    ReadHook {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Out-of-process hook could not be started at all.
    #[error("failed to spawn hook '{}' at {}", .stage.file_name(), .path.display())]
    SpawnHook {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The wrapped assemble command exited nonzero.
    #[error("original command failed with {result}")]
    OriginalFailed { result: ExecutionResult },

    /// The wrapped assemble command could not be started.
    #[error("failed to run original command {}", .path.display())]
    OriginalUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The wrapped run command could not replace this process. Always
    /// reported before any transfer occurs; after a successful transfer
    /// there is no process left to report from.
    #[error("failed to transfer to {}", .path.display())]
    TransferFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HookError {
    /// Exit code the wrapping process should propagate for this failure:
    /// the failing child's own status where one exists, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::HookFailed { result, .. } | Self::OriginalFailed { result } => {
                result.exit_code()
            }
            _ => 1,
        }
    }
}
