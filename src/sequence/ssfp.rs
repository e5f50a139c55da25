//! Balanced SSFP sequences (phase-cycled), with and without finite pulses.
//!
//! JSON:
//! - `SSFP`: `{"TR": s, "FA": [deg], "PhaseInc": [deg]}`
//! - `SSFPFinite`: as above plus `"Trf": s`
//!
//! `FA` and `PhaseInc` are parallel arrays: sample `i` was acquired with
//! flip angle `FA[i]` and RF phase increment `PhaseInc[i]`.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::sequence::{
    Sequence, degrees_to_radians, ensure_finite, ensure_positive, parse_fields, radians_to_degrees,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SsfpFields {
    #[serde(rename = "TR")]
    tr: f64,
    #[serde(rename = "FA")]
    fa: Vec<f64>,
    #[serde(rename = "PhaseInc")]
    phase_inc: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SsfpFiniteFields {
    #[serde(rename = "TR")]
    tr: f64,
    #[serde(rename = "Trf")]
    trf: f64,
    #[serde(rename = "FA")]
    fa: Vec<f64>,
    #[serde(rename = "PhaseInc")]
    phase_inc: Vec<f64>,
}

/// Phase-cycled bSSFP: one repetition time, parallel flip/increment arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct SsfpSequence {
    /// Repetition time (s).
    pub tr: f64,
    /// Flip angles (rad).
    pub flip: Vec<f64>,
    /// RF phase increments (rad).
    pub phase_inc: Vec<f64>,
}

impl SsfpSequence {
    pub const NAME: &'static str = "SSFP";

    /// Build from radians, enforcing the parallel-array invariant.
    pub fn new(tr: f64, flip: Vec<f64>, phase_inc: Vec<f64>) -> Result<Self, AppError> {
        validate_ssfp(Self::NAME, tr, &flip, &phase_inc)?;
        Ok(Self { tr, flip, phase_inc })
    }

    /// Every flip angle at every phase increment (increment-major), in degrees.
    ///
    /// `factorial(0.005, &[5., 10.], &[0., 180.])` yields the samples
    /// `(5,0) (10,0) (5,180) (10,180)`.
    pub fn factorial(tr: f64, flips_deg: &[f64], increments_deg: &[f64]) -> Result<Self, AppError> {
        let mut flip = Vec::with_capacity(flips_deg.len() * increments_deg.len());
        let mut phase_inc = Vec::with_capacity(flip.capacity());
        for &inc in increments_deg {
            for &fa in flips_deg {
                flip.push(fa.to_radians());
                phase_inc.push(inc.to_radians());
            }
        }
        Self::new(tr, flip, phase_inc)
    }

    pub fn from_json(json: &Value) -> Result<Self, AppError> {
        let f: SsfpFields = parse_fields(Self::NAME, json)?;
        Self::new(f.tr, degrees_to_radians(&f.fa), degrees_to_radians(&f.phase_inc))
    }
}

impl Sequence for SsfpSequence {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.flip.len()
    }

    fn weights(&self, f0: f64) -> Option<Vec<f64>> {
        Some(off_resonance_weights(&self.phase_inc, self.tr, f0))
    }

    fn to_json(&self) -> Value {
        serde_json::json!(SsfpFields {
            tr: self.tr,
            fa: radians_to_degrees(&self.flip),
            phase_inc: radians_to_degrees(&self.phase_inc),
        })
    }
}

/// bSSFP with a finite RF pulse duration `Trf`.
#[derive(Debug, Clone, PartialEq)]
pub struct SsfpFiniteSequence {
    pub tr: f64,
    /// RF pulse duration (s).
    pub trf: f64,
    pub flip: Vec<f64>,
    pub phase_inc: Vec<f64>,
}

impl SsfpFiniteSequence {
    pub const NAME: &'static str = "SSFPFinite";

    pub fn new(tr: f64, trf: f64, flip: Vec<f64>, phase_inc: Vec<f64>) -> Result<Self, AppError> {
        validate_ssfp(Self::NAME, tr, &flip, &phase_inc)?;
        ensure_positive(Self::NAME, "Trf", trf)?;
        if trf >= tr {
            return Err(AppError::config(format!(
                "While reading {} sequence: Trf ({trf}) must be shorter than TR ({tr})",
                Self::NAME
            )));
        }
        Ok(Self {
            tr,
            trf,
            flip,
            phase_inc,
        })
    }

    pub fn from_json(json: &Value) -> Result<Self, AppError> {
        let f: SsfpFiniteFields = parse_fields(Self::NAME, json)?;
        Self::new(
            f.tr,
            f.trf,
            degrees_to_radians(&f.fa),
            degrees_to_radians(&f.phase_inc),
        )
    }
}

impl Sequence for SsfpFiniteSequence {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.flip.len()
    }

    fn weights(&self, f0: f64) -> Option<Vec<f64>> {
        Some(off_resonance_weights(&self.phase_inc, self.tr, f0))
    }

    fn to_json(&self) -> Value {
        serde_json::json!(SsfpFiniteFields {
            tr: self.tr,
            trf: self.trf,
            fa: radians_to_degrees(&self.flip),
            phase_inc: radians_to_degrees(&self.phase_inc),
        })
    }
}

/// `0.75 * sin²((PhaseInc + 2π·f0·TR) / 2)` per sample.
pub fn off_resonance_weights(phase_inc: &[f64], tr: f64, f0: f64) -> Vec<f64> {
    phase_inc
        .iter()
        .map(|&inc| {
            let offset = inc + 2.0 * PI * f0 * tr;
            0.75 * (offset / 2.0).sin().powi(2)
        })
        .collect()
}

fn validate_ssfp(name: &str, tr: f64, flip: &[f64], phase_inc: &[f64]) -> Result<(), AppError> {
    ensure_positive(name, "TR", tr)?;
    if flip.len() != phase_inc.len() {
        return Err(AppError::config(format!(
            "While reading {name} sequence: number of phase increments ({}) did not match the number of flip angles ({})",
            phase_inc.len(),
            flip.len()
        )));
    }
    if flip.is_empty() {
        return Err(AppError::config(format!(
            "While reading {name} sequence: FA and PhaseInc must not be empty"
        )));
    }
    ensure_finite(name, "FA", flip)?;
    ensure_finite(name, "PhaseInc", phase_inc)
}
