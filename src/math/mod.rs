//! Numerical utilities: bounded nonlinear least squares.

pub mod lm;

pub use lm::*;
