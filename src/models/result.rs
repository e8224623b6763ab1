//! Notebook result models
//!
//! Defines the reported status of each notebook and the summary of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::{ExecutionOutcome, Notebook, NotebookState};

/// Reported status; a notebook run is binary pass/fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotebookStatus {
    Pass,
    Fail,
}

impl NotebookStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            NotebookStatus::Pass => "✓",
            NotebookStatus::Fail => "✗",
        }
    }
}

impl fmt::Display for NotebookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotebookStatus::Pass => write!(f, "PASS"),
            NotebookStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of a single notebook execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotebookResult {
    /// Notebook file name
    pub notebook: String,
    /// Absolute path of the input notebook
    pub path: PathBuf,
    /// Executed notebook location
    pub output_path: PathBuf,
    pub status: NotebookStatus,
    pub state: NotebookState,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    /// Failure message naming the notebook and its output path
    pub message: Option<String>,
    /// Captured standard error, kept for failures only
    pub stderr: Option<String>,
}

impl NotebookResult {
    pub fn pass(notebook: &Notebook, outcome: &ExecutionOutcome) -> Self {
        Self {
            notebook: notebook.file_name(),
            path: notebook.path().to_path_buf(),
            output_path: outcome.output_path.clone(),
            status: NotebookStatus::Pass,
            state: NotebookState::Passed,
            duration_ms: outcome.duration_ms,
            exit_code: outcome.exit_code,
            message: None,
            stderr: None,
        }
    }

    pub fn fail(
        notebook: &Notebook,
        outcome: &ExecutionOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notebook: notebook.file_name(),
            path: notebook.path().to_path_buf(),
            output_path: outcome.output_path.clone(),
            status: NotebookStatus::Fail,
            state: NotebookState::Failed,
            duration_ms: outcome.duration_ms,
            exit_code: outcome.exit_code,
            message: Some(message.into()),
            stderr: Some(outcome.stderr.clone()),
        }
    }
}

impl fmt::Display for NotebookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.notebook,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of one harness run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// Revision the change set was computed against
    pub base_revision: Option<String>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
    pub results: Vec<NotebookResult>,
}

impl RunSummary {
    pub fn new(base_revision: Option<String>, results: Vec<NotebookResult>) -> Self {
        let total = results.len();
        let passed = results
            .iter()
            .filter(|r| r.status == NotebookStatus::Pass)
            .count();
        let failed = total - passed;
        let total_duration_ms = results.iter().map(|r| r.duration_ms).sum();

        Self {
            base_revision,
            total,
            passed,
            failed,
            total_duration_ms,
            results,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Process exit code: 0 when every notebook passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_all_passed() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &NotebookResult> {
        self.results
            .iter()
            .filter(|r| r.status == NotebookStatus::Fail)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Notebooks changed since {}",
            self.base_revision.as_deref().unwrap_or("<unresolved>")
        )?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {}",
            self.total, self.passed, self.failed
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}
