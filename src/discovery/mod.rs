//! Notebook discovery
//!
//! Resolves the base revision and computes the sorted work list once, before
//! any notebook runs.

mod revision;
mod selector;

use thiserror::Error;

pub use revision::resolve_base_revision;
pub use selector::{NotebookSelector, Selection};

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Can't find a base revision to compare the files with (tried {})", .candidates.join(", "))]
    NoBaseRevisionFound { candidates: Vec<String> },

    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}
