//! Parallel per-voxel application of a model to a set of volumes.
//!
//! Responsibilities:
//!
//! - partition the masked, sub-windowed voxel set into blocks
//! - fit blocks concurrently and write results into disjoint output windows
//! - merge per-block residual totals and report progress
//! - forward-simulate measurement volumes from parameter maps

pub mod apply;
pub mod partition;
pub mod progress;
pub mod simulate;

pub use apply::*;
pub use partition::*;
pub use progress::*;
pub use simulate::*;
