//! Output formatting module
//!
//! Renders work lists, per-notebook results and run summaries.

mod formatter;

pub use formatter::{OutputFormat, ResultFormatter};
