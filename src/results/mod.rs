//! Result reporting and persistence
//!
//! Maps execution outcomes to pass/fail results and stores run reports.

pub mod reporter;
mod storage;

pub use storage::RunReport;
