//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the model registry key (`ModelKind`)
//! - resolved run configurations (`RunConfig`, `SynthConfig`)

pub mod types;

pub use types::*;
