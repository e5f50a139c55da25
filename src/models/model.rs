//! The per-voxel model contract.
//!
//! A model binds one sequence description and a set of run-level constants.
//! After construction it is read-only: the engine shares one instance across
//! all worker threads and calls [`Model::fit`] once per included voxel.
//!
//! Two vectors flow through every call:
//! - `varying`: the fitted parameters, in schema order
//! - `fixed`: per-voxel values supplied to (not estimated by) the model,
//!   either from constant volumes or from the schema defaults

use std::collections::BTreeMap;

use crate::error::AppError;
use crate::math::{LmConfig, minimize, rss_norm};
use crate::sequence::Sequence;

/// One fitted parameter: name, starting guess and box bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub start: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ParameterSpec {
    pub const fn new(name: &'static str, start: f64, lower: f64, upper: f64) -> Self {
        Self {
            name,
            start,
            lower,
            upper,
        }
    }
}

/// One per-voxel fixed input with the value used when no volume is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSpec {
    pub name: &'static str,
    pub default: f64,
}

impl FixedSpec {
    pub const fn new(name: &'static str, default: f64) -> Self {
        Self { name, default }
    }
}

/// Validated parameter layout of a model.
///
/// All dimension and bound checks happen here, once, so the per-voxel path
/// can index the vectors without re-checking.
#[derive(Debug, Clone)]
pub struct ParameterSchema {
    varying: Vec<ParameterSpec>,
    fixed: Vec<FixedSpec>,
    start: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    fixed_defaults: Vec<f64>,
}

impl ParameterSchema {
    pub fn new(varying: &[ParameterSpec], fixed: &[FixedSpec]) -> Result<Self, AppError> {
        if varying.is_empty() {
            return Err(AppError::config("A model needs at least one varying parameter."));
        }
        for p in varying {
            let ordered = p.lower < p.upper && p.start >= p.lower && p.start <= p.upper;
            if !(p.start.is_finite() && p.lower.is_finite() && p.upper.is_finite() && ordered) {
                return Err(AppError::config(format!(
                    "Parameter {}: start {} must lie within [{}, {}]",
                    p.name, p.start, p.lower, p.upper
                )));
            }
        }
        let mut names: Vec<&str> = varying
            .iter()
            .map(|p| p.name)
            .chain(fixed.iter().map(|f| f.name))
            .collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(AppError::config(format!("Duplicate parameter name '{}'", w[0])));
        }

        Ok(Self {
            varying: varying.to_vec(),
            fixed: fixed.to_vec(),
            start: varying.iter().map(|p| p.start).collect(),
            lower: varying.iter().map(|p| p.lower).collect(),
            upper: varying.iter().map(|p| p.upper).collect(),
            fixed_defaults: fixed.iter().map(|f| f.default).collect(),
        })
    }

    pub fn varying(&self) -> &[ParameterSpec] {
        &self.varying
    }

    pub fn fixed(&self) -> &[FixedSpec] {
        &self.fixed
    }

    pub fn varying_names(&self) -> Vec<&'static str> {
        self.varying.iter().map(|p| p.name).collect()
    }

    pub fn fixed_names(&self) -> Vec<&'static str> {
        self.fixed.iter().map(|f| f.name).collect()
    }

    pub fn start(&self) -> &[f64] {
        &self.start
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn fixed_defaults(&self) -> &[f64] {
        &self.fixed_defaults
    }

    pub fn fixed_index(&self, name: &str) -> Option<usize> {
        self.fixed.iter().position(|f| f.name == name)
    }

    pub fn varying_index(&self, name: &str) -> Option<usize> {
        self.varying.iter().position(|p| p.name == name)
    }
}

/// Result of fitting one voxel.
///
/// Non-convergence is not an error: `converged` is false and `varying`
/// holds the best estimate reached.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub varying: Vec<f64>,
    /// Root-sum-square of `residuals`.
    pub residual: f64,
    /// `measured - signal(varying, fixed)` per sample (unweighted).
    pub residuals: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Per-model optimiser settings.
#[derive(Debug, Clone, Default)]
pub struct FitSettings {
    pub lm: LmConfig,
    /// Scale residuals by `sqrt(weights(f0))` during the fit.
    pub weighted: bool,
}

/// Run-level numeric constants bound into a model (`--const NAME=VALUE`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelConstants {
    values: BTreeMap<String, f64>,
}

impl ModelConstants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// `other`'s values replace ours where both are set.
    pub fn merge(mut self, other: &ModelConstants) -> Self {
        self.values
            .extend(other.values.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    /// Resolve against a model's constant table, in table order.
    ///
    /// Unknown names and non-finite values are configuration errors.
    pub fn resolve(&self, model: &str, table: &[(&'static str, f64)]) -> Result<Vec<f64>, AppError> {
        if let Some(unknown) = self.values.keys().find(|k| !table.iter().any(|(n, _)| n == k)) {
            let known: Vec<&str> = table.iter().map(|(n, _)| *n).collect();
            return Err(AppError::config(format!(
                "Model {model} has no constant '{unknown}' (known: {})",
                known.join(", ")
            )));
        }
        table
            .iter()
            .map(|&(name, default)| {
                let value = self.values.get(name).copied().unwrap_or(default);
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(AppError::config(format!("Model {model}: constant {name} must be finite")))
                }
            })
            .collect()
    }
}

impl std::str::FromStr for ModelConstants {
    type Err = AppError;

    /// Parses `NAME=VALUE[,NAME=VALUE...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = ModelConstants::new();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| AppError::config(format!("Invalid constant '{part}', expected NAME=VALUE")))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid value for constant '{}': {e}", name.trim())))?;
            out.insert(name.trim(), value);
        }
        Ok(out)
    }
}

/// A physical signal model applied independently to every voxel.
pub trait Model: std::fmt::Debug + Send + Sync {
    /// Short name, used as the output file prefix.
    fn name(&self) -> &'static str;

    fn schema(&self) -> &ParameterSchema;

    fn sequence(&self) -> &dyn Sequence;

    /// Number of measured samples expected per voxel.
    fn input_size(&self) -> usize {
        self.sequence().size()
    }

    /// Forward model: predicted samples for the given parameters.
    fn signal(&self, varying: &[f64], fixed: &[f64]) -> Vec<f64>;

    /// Per-sample off-resonance weights, for models that define them.
    fn weights(&self, _f0: f64) -> Option<Vec<f64>> {
        None
    }

    /// Estimate the varying parameters for one voxel.
    ///
    /// Deterministic for identical inputs and infallible: failures show up as
    /// `converged = false`.
    fn fit(&self, measured: &[f64], fixed: &[f64]) -> FitOutcome {
        fit_least_squares(self, measured, fixed, &FitSettings::default())
    }
}

/// Bounded least-squares fit of `model` to one measurement vector.
pub fn fit_least_squares<M: Model + ?Sized>(
    model: &M,
    measured: &[f64],
    fixed: &[f64],
    settings: &FitSettings,
) -> FitOutcome {
    let schema = model.schema();

    let scale: Option<Vec<f64>> = if settings.weighted {
        let f0 = schema.fixed_index("f0").map_or(0.0, |i| fixed[i]);
        model
            .weights(f0)
            .map(|w| w.iter().map(|w| w.max(0.0).sqrt()).collect())
    } else {
        None
    };

    let result = minimize(
        |p| {
            let predicted = model.signal(p, fixed);
            measured
                .iter()
                .zip(predicted.iter())
                .enumerate()
                .map(|(i, (m, s))| {
                    let r = m - s;
                    match &scale {
                        Some(w) => r * w[i],
                        None => r,
                    }
                })
                .collect()
        },
        schema.start(),
        schema.lower(),
        schema.upper(),
        &settings.lm,
    );

    let residuals = residual_vector(model, measured, &result.params, fixed);
    FitOutcome {
        residual: rss_norm(&residuals),
        residuals,
        varying: result.params,
        iterations: result.iterations,
        converged: result.converged,
    }
}

/// `measured - signal(varying, fixed)`.
pub fn residual_vector<M: Model + ?Sized>(model: &M, measured: &[f64], varying: &[f64], fixed: &[f64]) -> Vec<f64> {
    let predicted = model.signal(varying, fixed);
    measured
        .iter()
        .zip(predicted.iter())
        .map(|(m, s)| m - s)
        .collect()
}
