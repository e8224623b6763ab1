//! Execution outcome models
//!
//! Captured streams and status of one notebook pipeline, plus the per-item
//! state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Step of the per-notebook pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    PrepareOutput,
    Clone,
    Execute,
}

impl RunStep {
    /// Pipeline order; each step depends on the filesystem state left by
    /// the previous one
    pub const ALL: [RunStep; 3] = [RunStep::PrepareOutput, RunStep::Clone, RunStep::Execute];

    /// State a work item is in while this step runs
    pub fn state(&self) -> NotebookState {
        match self {
            RunStep::PrepareOutput => NotebookState::Pending,
            RunStep::Clone => NotebookState::Cloning,
            RunStep::Execute => NotebookState::Executing,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunStep::PrepareOutput => "prepare output directory",
            RunStep::Clone => "clone environment",
            RunStep::Execute => "execute notebook",
        }
    }
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of a work item: `Pending -> Cloning -> Executing -> Passed | Failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotebookState {
    Pending,
    Cloning,
    Executing,
    Passed,
    Failed,
}

impl NotebookState {
    /// Whether `next` is a legal successor. There are no retries, so nothing
    /// leads back to `Pending` and terminal states have no successor.
    pub fn can_transition_to(&self, next: NotebookState) -> bool {
        use NotebookState::*;
        matches!(
            (self, next),
            (Pending, Cloning)
                | (Pending, Failed)
                | (Cloning, Executing)
                | (Cloning, Failed)
                | (Executing, Passed)
                | (Executing, Failed)
        )
    }
}

impl fmt::Display for NotebookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotebookState::Pending => write!(f, "PENDING"),
            NotebookState::Cloning => write!(f, "CLONING"),
            NotebookState::Executing => write!(f, "EXECUTING"),
            NotebookState::Passed => write!(f, "PASSED"),
            NotebookState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Everything captured while running one notebook
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Standard output of all steps that ran
    pub stdout: String,
    /// Standard error of all steps that ran
    pub stderr: String,
    /// Exit status of the last step; `None` when it never produced one
    pub exit_code: Option<i32>,
    /// Step that aborted the pipeline
    pub failed_step: Option<RunStep>,
    /// Execution was killed after exceeding the timeout
    pub timed_out: bool,
    /// Where the executed notebook is written, as shown to users
    pub output_path: PathBuf,
    /// Last state the pipeline reached before finishing
    pub reached: NotebookState,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            failed_step: None,
            timed_out: false,
            output_path: output_path.into(),
            reached: NotebookState::Pending,
            duration_ms: 0,
        }
    }

    /// Binary pass/fail: every step ran and the last one exited with 0
    pub fn passed(&self) -> bool {
        self.failed_step.is_none() && self.exit_code == Some(0)
    }

    /// Exit status as reported to users, `-1` when none was produced
    pub fn status_code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// Final state derived from the captured status
    pub fn final_state(&self) -> NotebookState {
        if self.passed() {
            NotebookState::Passed
        } else {
            NotebookState::Failed
        }
    }

    pub(crate) fn append_streams(&mut self, stdout: &str, stderr: &str) {
        self.stdout.push_str(stdout);
        self.stderr.push_str(stderr);
    }
}
