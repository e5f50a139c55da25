//! Two-pool magnetization transfer bSSFP model.
//!
//! The bound pool has no observable transverse signal; it is saturated by the
//! RF train at the mean rate
//!
//! ```text
//! W = π γ² G(0) b1² p2 Trf / TR,   b1 = α / (γ p1 Trf),   G(0) = T2_r / √(2π)
//! ```
//!
//! and exchanges with the free pool at `k_f` (forward) and `k_f / F`
//! (backward). The free pool then behaves as a single pool with
//!
//! ```text
//! R1_eff = R1_f + k_f (R1_b + W) / (R1_b + W + k_b)
//! M0_eff = M0 (R1_f + k_f R1_b / (R1_b + W + k_b)) / R1_eff
//! ```
//!
//! observed with the on-resonance bSSFP signal at a phase increment of π.

use std::f64::consts::PI;

use crate::error::AppError;
use crate::models::model::{
    FitOutcome, FitSettings, FixedSpec, Model, ModelConstants, ParameterSchema, ParameterSpec,
    fit_least_squares,
};
use crate::models::ssfp::bssfp_magnitude;
use crate::sequence::{Sequence, SsfpMtSequence};

/// Proton gyromagnetic ratio (rad/s/T).
pub const GAMMA: f64 = 2.0 * PI * 42.5764e6;

pub(crate) const MT_VARYING: [ParameterSpec; 3] = [
    ParameterSpec::new("M0", 30.0, 0.1, 60.0),
    ParameterSpec::new("F", 0.1, 0.001, 0.5),
    ParameterSpec::new("T1_f", 1.0, 0.1, 5.0),
];

pub(crate) const MT_FIXED: [FixedSpec; 2] = [FixedSpec::new("f0", 0.0), FixedSpec::new("B1", 1.0)];

pub(crate) const MT_CONSTANTS: [(&str, f64); 4] = [("T2_f", 0.05), ("k_f", 4.3), ("R1_b", 1.0), ("T2_r", 12e-6)];

#[derive(Debug, Clone)]
pub struct SsfpMtModel {
    sequence: SsfpMtSequence,
    schema: ParameterSchema,
    t2_f: f64,
    k_f: f64,
    r1_b: f64,
    t2_r: f64,
    settings: FitSettings,
}

impl SsfpMtModel {
    pub const NAME: &'static str = "SSFPMT";

    pub fn new(sequence: SsfpMtSequence, constants: &ModelConstants, settings: FitSettings) -> Result<Self, AppError> {
        let c = constants.resolve(Self::NAME, &MT_CONSTANTS)?;
        for (&(name, _), &value) in MT_CONSTANTS.iter().zip(c.iter()) {
            if value <= 0.0 {
                return Err(AppError::config(format!(
                    "Model {}: {name} must be > 0, got {value}",
                    Self::NAME
                )));
            }
        }
        Ok(Self {
            sequence,
            schema: ParameterSchema::new(&MT_VARYING, &MT_FIXED)?,
            t2_f: c[0],
            k_f: c[1],
            r1_b: c[2],
            t2_r: c[3],
            settings,
        })
    }

    /// Mean bound-pool saturation rate for one sample.
    pub fn saturation_rate(&self, alpha: f64, tr: f64, trf: f64) -> f64 {
        let pulse = &self.sequence.pulse;
        let line_shape = self.t2_r / (2.0 * PI).sqrt();
        let b1 = alpha / (GAMMA * pulse.p1 * trf);
        PI * GAMMA * GAMMA * line_shape * b1 * b1 * pulse.p2 * trf / tr
    }
}

impl Model for SsfpMtModel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    fn sequence(&self) -> &dyn Sequence {
        &self.sequence
    }

    fn signal(&self, varying: &[f64], fixed: &[f64]) -> Vec<f64> {
        let (m0, f, t1_f) = (varying[0], varying[1], varying[2]);
        let (f0, b1) = (fixed[0], fixed[1]);
        let r1_f = 1.0 / t1_f;
        let k_b = self.k_f / f;
        let seq = &self.sequence;

        seq.tr
            .iter()
            .zip(seq.trf.iter())
            .zip(seq.flip.iter())
            .map(|((&tr, &trf), &fa)| {
                let alpha = b1 * fa;
                let w = self.saturation_rate(alpha, tr, trf);
                let bound = self.r1_b + w + k_b;
                let r1_eff = r1_f + self.k_f * (self.r1_b + w) / bound;
                let m0_eff = m0 * (r1_f + self.k_f * self.r1_b / bound) / r1_eff;
                let theta = PI + 2.0 * PI * f0 * tr;
                bssfp_magnitude(m0_eff, 1.0 / r1_eff, self.t2_f, alpha, theta, tr, tr)
            })
            .collect()
    }

    fn fit(&self, measured: &[f64], fixed: &[f64]) -> FitOutcome {
        fit_least_squares(self, measured, fixed, &self.settings)
    }
}
