//! Notebook execution engine
//!
//! Per-notebook isolated runs, bounded fan-out, and the session tying
//! discovery and environment setup together.

mod parallel;
mod runner;
mod session;

pub use parallel::{ParallelExecutor, Shard};
pub use runner::{NotebookRunner, RunnerSettings};
pub use session::{Harness, RunPlan};
