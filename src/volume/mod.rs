//! Voxel grids shared by every input, mask, constant and output volume.
//!
//! - `grid`: geometry metadata, linear indexing, sub-windows (`Region`)
//! - `data`: scalar/vector volumes and boolean masks

pub mod data;
pub mod grid;

pub use data::*;
pub use grid::*;
