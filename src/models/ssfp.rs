//! Balanced SSFP signal models (ideal and finite-pulse).
//!
//! Both variants fit `M0`, `T1` and `B1` from a set of phase-cycled bSSFP
//! magnitudes with `T2` held at a run-level constant and the off-resonance
//! frequency `f0` supplied per voxel.
//!
//! Signal (magnitude, α = B1·FA, θ = PhaseInc + 2π·f0·TR):
//!
//! ```text
//! E1 = exp(-TR/T1)           E2 = exp(-TR₂/T2)
//! C  = E2 (E1 - 1)(1 + cos α)
//! D  = (1 - E1 cos α) - (E1 - cos α) E2²
//! S  = | M0 (1 - E1) sin α · sqrt(1 - 2 E2 cos θ + E2²) / (C cos θ + D) |
//! ```
//!
//! `TR₂ = TR` for the ideal model and `TR - zeta·Trf` for the finite-pulse one.

use std::f64::consts::PI;

use crate::error::AppError;
use crate::models::model::{
    FitOutcome, FitSettings, FixedSpec, Model, ModelConstants, ParameterSchema, ParameterSpec,
    fit_least_squares,
};
use crate::sequence::{Sequence, SsfpFiniteSequence, SsfpSequence};

pub(crate) const SSFP_VARYING: [ParameterSpec; 3] = [
    ParameterSpec::new("M0", 30.0, 0.1, 60.0),
    ParameterSpec::new("T1", 1.0, 0.5, 5.0),
    ParameterSpec::new("B1", 1.0, 0.5, 1.5),
];

pub(crate) const SSFP_FIXED: [FixedSpec; 1] = [FixedSpec::new("f0", 0.0)];

pub(crate) const SSFP_CONSTANTS: [(&str, f64); 1] = [("T2", 0.1)];
pub(crate) const SSFP_FINITE_CONSTANTS: [(&str, f64); 2] = [("T2", 0.1), ("zeta", 0.68)];

/// Steady-state bSSFP magnitude for one sample.
///
/// `t2_interval` is the time over which transverse relaxation acts per TR.
pub(crate) fn bssfp_magnitude(m0: f64, t1: f64, t2: f64, alpha: f64, theta: f64, tr: f64, t2_interval: f64) -> f64 {
    let e1 = (-tr / t1).exp();
    let e2 = (-t2_interval / t2).exp();
    let (sin_a, cos_a) = alpha.sin_cos();
    let cos_t = theta.cos();

    let c = e2 * (e1 - 1.0) * (1.0 + cos_a);
    let d = (1.0 - e1 * cos_a) - (e1 - cos_a) * e2 * e2;
    let numerator = m0 * (1.0 - e1) * sin_a * (1.0 - 2.0 * e2 * cos_t + e2 * e2).sqrt();
    (numerator / (c * cos_t + d)).abs()
}

/// Ideal (instantaneous pulse) phase-cycled bSSFP.
#[derive(Debug, Clone)]
pub struct SsfpModel {
    sequence: SsfpSequence,
    schema: ParameterSchema,
    t2: f64,
    settings: FitSettings,
}

impl SsfpModel {
    pub const NAME: &'static str = "SSFP";

    pub fn new(sequence: SsfpSequence, constants: &ModelConstants, settings: FitSettings) -> Result<Self, AppError> {
        let resolved = constants.resolve(Self::NAME, &SSFP_CONSTANTS)?;
        let t2 = resolved[0];
        if t2 <= 0.0 {
            return Err(AppError::config(format!("Model {}: T2 must be > 0, got {t2}", Self::NAME)));
        }
        Ok(Self {
            sequence,
            schema: ParameterSchema::new(&SSFP_VARYING, &SSFP_FIXED)?,
            t2,
            settings,
        })
    }

    pub fn t2(&self) -> f64 {
        self.t2
    }
}

impl Model for SsfpModel {
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
        let (m0, t1, b1) = (varying[0], varying[1], varying[2]);
        let tr = self.sequence.tr;
        let f0_phase = 2.0 * PI * fixed[0] * tr;
        self.sequence
            .flip
            .iter()
            .zip(self.sequence.phase_inc.iter())
            .map(|(&fa, &inc)| bssfp_magnitude(m0, t1, self.t2, b1 * fa, inc + f0_phase, tr, tr))
            .collect()
    }

    fn weights(&self, f0: f64) -> Option<Vec<f64>> {
        self.sequence.weights(f0)
    }

    fn fit(&self, measured: &[f64], fixed: &[f64]) -> FitOutcome {
        fit_least_squares(self, measured, fixed, &self.settings)
    }
}

/// bSSFP with relaxation during a finite RF pulse.
#[derive(Debug, Clone)]
pub struct SsfpFiniteModel {
    sequence: SsfpFiniteSequence,
    schema: ParameterSchema,
    t2: f64,
    zeta: f64,
    settings: FitSettings,
}

impl SsfpFiniteModel {
    pub const NAME: &'static str = "SSFPFinite";

    pub fn new(sequence: SsfpFiniteSequence, constants: &ModelConstants, settings: FitSettings) -> Result<Self, AppError> {
        let resolved = constants.resolve(Self::NAME, &SSFP_FINITE_CONSTANTS)?;
        let (t2, zeta) = (resolved[0], resolved[1]);
        if t2 <= 0.0 {
            return Err(AppError::config(format!("Model {}: T2 must be > 0, got {t2}", Self::NAME)));
        }
        if !(0.0..=1.0).contains(&zeta) {
            return Err(AppError::config(format!(
                "Model {}: zeta must lie within [0, 1], got {zeta}",
                Self::NAME
            )));
        }
        Ok(Self {
            sequence,
            schema: ParameterSchema::new(&SSFP_VARYING, &SSFP_FIXED)?,
            t2,
            zeta,
            settings,
        })
    }
}

impl Model for SsfpFiniteModel {
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
        let (m0, t1, b1) = (varying[0], varying[1], varying[2]);
        let seq = &self.sequence;
        let f0_phase = 2.0 * PI * fixed[0] * seq.tr;
        let t2_interval = seq.tr - self.zeta * seq.trf;
        seq.flip
            .iter()
            .zip(seq.phase_inc.iter())
            .map(|(&fa, &inc)| bssfp_magnitude(m0, t1, self.t2, b1 * fa, inc + f0_phase, seq.tr, t2_interval))
            .collect()
    }

    fn weights(&self, f0: f64) -> Option<Vec<f64>> {
        self.sequence.weights(f0)
    }

    fn fit(&self, measured: &[f64], fixed: &[f64]) -> FitOutcome {
        fit_least_squares(self, measured, fixed, &self.settings)
    }
}
