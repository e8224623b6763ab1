//! Result reporting
//!
//! Turns an execution outcome into a binary pass/fail result. Passing
//! notebooks are silent; failures print the captured error stream so CI
//! logs show the cause inline, then carry a message naming the notebook and
//! where its executed copy was written.

use tracing::{debug, error};

use crate::models::{ExecutionOutcome, Notebook, NotebookResult};

/// Report one notebook's outcome
pub fn report(notebook: &Notebook, outcome: &ExecutionOutcome) -> NotebookResult {
    if outcome.passed() {
        debug!("{} passed in {}ms", notebook, outcome.duration_ms);
        return NotebookResult::pass(notebook, outcome);
    }

    let message = failure_message(notebook, outcome);
    if !outcome.stderr.is_empty() {
        eprintln!("{}", outcome.stderr.trim_end());
    }
    error!("{}", message);

    NotebookResult::fail(notebook, outcome, message)
}

/// Failure headline naming the notebook file and its output path
pub fn failure_message(notebook: &Notebook, outcome: &ExecutionOutcome) -> String {
    let mut message = format!(
        "Notebook failure: {}, please see {} for the output notebook",
        notebook.file_name(),
        outcome.output_path.display()
    );

    if outcome.timed_out {
        message.push_str(" (execution timed out)");
    } else if let Some(step) = outcome.failed_step {
        match outcome.exit_code {
            Some(code) => message.push_str(&format!(" ({step} exited with status {code})")),
            None => message.push_str(&format!(" ({step} failed)")),
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotebookState, NotebookStatus, RunStep};
    use std::path::{Path, PathBuf};

    fn foo() -> Notebook {
        Notebook::new("/repo/docs/simulation/foo.ipynb", Path::new("/repo"))
    }

    fn outcome(exit_code: Option<i32>, failed_step: Option<RunStep>) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::new("out/docs/simulation/foo.out.ipynb");
        outcome.exit_code = exit_code;
        outcome.failed_step = failed_step;
        outcome.reached = NotebookState::Executing;
        outcome.stderr = "NameError: name 'cirq' is not defined\n".to_string();
        outcome
    }

    #[test]
    fn test_pass_is_silent() {
        let result = report(&foo(), &outcome(Some(0), None));
        assert_eq!(result.status, NotebookStatus::Pass);
        assert_eq!(result.state, NotebookState::Passed);
        assert!(result.message.is_none());
        assert!(result.stderr.is_none());
    }

    #[test]
    fn test_failure_names_notebook_and_output() {
        let result = report(&foo(), &outcome(Some(1), Some(RunStep::Execute)));

        assert_eq!(result.status, NotebookStatus::Fail);
        assert_eq!(result.state, NotebookState::Failed);
        assert_eq!(result.exit_code, Some(1));
        let message = result.message.unwrap();
        assert!(message.contains("foo.ipynb"));
        assert!(message.contains("out/docs/simulation/foo.out.ipynb"));
        assert!(message.contains("status 1"));
        assert!(result.stderr.unwrap().contains("NameError"));
        assert_eq!(
            result.output_path,
            PathBuf::from("out/docs/simulation/foo.out.ipynb")
        );
    }

    #[test]
    fn test_timeout_message() {
        let mut timed_out = outcome(None, Some(RunStep::Execute));
        timed_out.timed_out = true;
        assert!(failure_message(&foo(), &timed_out).ends_with("(execution timed out)"));
    }
}
