//! Data models for notebook runs
//!
//! Work items, execution outcomes and reported results.

mod notebook;
mod outcome;
mod result;

pub use notebook::Notebook;
pub use outcome::{ExecutionOutcome, NotebookState, RunStep};
pub use result::{NotebookResult, NotebookStatus, RunSummary};
