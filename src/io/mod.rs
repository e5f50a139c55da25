//! Input/output helpers.
//!
//! - volume JSON read/write (`volume`)
//! - sequence JSON input (`sequence`)
//! - output maps + run summary (`export`)

pub mod export;
pub mod sequence;
pub mod volume;

pub use export::*;
pub use sequence::*;
pub use volume::*;
