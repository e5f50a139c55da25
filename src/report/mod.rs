//! Reporting utilities: terminal summaries for runs and the model registry.

pub mod format;

pub use format::*;
