//! Hook-directory inspection backing `hookwrap check`.
//!
//! The interesting finding is a hook that exists without its executable
//! bit: image filesystems routinely drop the bit set by upstream tooling,
//! and the resulting "hook silently skipped" is the most common operator
//! mistake this tool sees. `check` reports it distinctly from "not
//! present" so CI can catch it before the image ships.

use std::path::{Path, PathBuf};

use crate::hooks::{HookFile, Stage, StageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Hook absent; the stage will be skipped.
    Missing,
    /// Hook present and usable.
    Ready,
    /// Out-of-process hook present without the executable bit.
    NotExecutable,
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub path: PathBuf,
    pub state: StageState,
}

/// Inspect every stage's hook in `hooks_dir`.
pub fn inspect(hooks_dir: &Path) -> Vec<StageReport> {
    Stage::ALL
        .iter()
        .map(|&stage| {
            let hook = HookFile::resolve(hooks_dir, stage);
            let state = if !hook.exists {
                StageState::Missing
            } else if stage.kind() == StageKind::OutOfProcess && !hook.executable {
                StageState::NotExecutable
            } else {
                StageState::Ready
            };
            StageReport {
                stage,
                path: hook.path,
                state,
            }
        })
        .collect()
}

/// Print a report for `hooks_dir`. Returns `false` when any hook would be
/// rejected under strict mode.
pub fn run(hooks_dir: &Path) -> bool {
    println!("🩺 hookwrap check");
    println!("  Hook directory: {}", hooks_dir.display());

    let mut broken = 0_u32;
    let mut present = 0_u32;
    for report in inspect(hooks_dir) {
        match report.state {
            StageState::Ready => {
                present += 1;
                println!("  ✅ {} ready", report.stage.file_name());
            }
            StageState::Missing => {
                println!("  ℹ️ {} not present (stage will be skipped)", report.stage.file_name());
            }
            StageState::NotExecutable => {
                broken += 1;
                println!(
                    "  ❌ {} present but not executable",
                    report.stage.file_name()
                );
                println!("  💡 fix with: chmod +x {}", report.path.display());
            }
        }
    }
    println!("  Summary: {present} ready, {broken} broken");
    broken == 0
}
