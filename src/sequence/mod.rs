//! Acquisition (sequence) descriptions.
//!
//! A sequence is loaded once per run from a JSON object of named scalars and
//! arrays and is immutable afterwards. Cross-field invariants (parallel
//! arrays of equal length, positive timings) are checked when the sequence is
//! built, never per voxel.
//!
//! JSON conventions: times in seconds, angles in degrees (converted to
//! radians on load).

pub mod mt;
pub mod ssfp;

pub use mt::*;
pub use ssfp::*;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;

/// Common view of a sequence.
pub trait Sequence: std::fmt::Debug + Send + Sync {
    /// Name used in error messages and summaries.
    fn name(&self) -> &'static str;

    /// Number of measured samples per voxel.
    fn size(&self) -> usize;

    /// Off-resonance sensitivity weights, for sequences that define them.
    fn weights(&self, _f0: f64) -> Option<Vec<f64>> {
        None
    }

    /// JSON form of the sequence (angles in degrees).
    fn to_json(&self) -> Value;
}

/// Deserialize a raw sequence object, reporting failures as configuration errors.
pub(crate) fn parse_fields<T: DeserializeOwned>(name: &str, json: &Value) -> Result<T, AppError> {
    serde_json::from_value(json.clone())
        .map_err(|e| AppError::config(format!("While reading {name} sequence: {e}")))
}

pub(crate) fn ensure_positive(name: &str, field: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "While reading {name} sequence: {field} must be finite and > 0, got {value}"
        )))
    }
}

pub(crate) fn ensure_finite(name: &str, field: &str, values: &[f64]) -> Result<(), AppError> {
    match values.iter().position(|v| !v.is_finite()) {
        None => Ok(()),
        Some(i) => Err(AppError::config(format!(
            "While reading {name} sequence: {field}[{i}] is not finite"
        ))),
    }
}

pub(crate) fn degrees_to_radians(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v.to_radians()).collect()
}

pub(crate) fn radians_to_degrees(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v.to_degrees()).collect()
}
