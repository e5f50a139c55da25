//! `qi-maps` library crate.
//!
//! Fits physical signal models to every voxel of a multi-contrast imaging
//! volume. The binary (`qi`) is a thin wrapper around this library so that:
//!
//! - the engine and models are testable without spawning processes
//! - models can be driven from other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod sequence;
pub mod telemetry;
pub mod volume;
