//! Shared helpers: logging, paths and timing.

pub mod logger;
pub mod path;
pub mod timer;

pub use timer::Timer;
