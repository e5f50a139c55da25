//! Shared domain types.
//!
//! These types are kept plain so the CLI layer can build them once and the
//! rest of the pipeline can consume them without touching `clap`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ModelConstants;
use crate::volume::Region;

/// Registered signal models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Phase-cycled bSSFP, instantaneous pulses.
    Ssfp,
    /// Phase-cycled bSSFP with finite-pulse T2 correction.
    SsfpFinite,
    /// Two-pool magnetization transfer bSSFP.
    SsfpMt,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Ssfp, ModelKind::SsfpFinite, ModelKind::SsfpMt];

    /// Name as typed on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Ssfp => "ssfp",
            ModelKind::SsfpFinite => "ssfp-finite",
            ModelKind::SsfpMt => "ssfp-mt",
        }
    }

    /// Model name used for output files (matches `Model::name`).
    pub fn model_name(self) -> &'static str {
        match self {
            ModelKind::Ssfp => "SSFP",
            ModelKind::SsfpFinite => "SSFPFinite",
            ModelKind::SsfpMt => "SSFPMT",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ModelKind::Ssfp => "Phase-cycled bSSFP (M0, T1, B1 with fixed T2)",
            ModelKind::SsfpFinite => "Phase-cycled bSSFP with finite RF pulse correction",
            ModelKind::SsfpMt => "bSSFP magnetization transfer (M0, F, T1_f)",
        }
    }
}

/// Fully-resolved configuration for `qi fit`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub model: ModelKind,
    /// Measurement volumes; their components are concatenated per voxel.
    pub inputs: Vec<PathBuf>,
    /// Sequence JSON file (stdin when absent).
    pub sequence: Option<PathBuf>,
    pub mask: Option<PathBuf>,
    /// Per-voxel fixed-value volumes, by fixed parameter name.
    pub fixed: Vec<(String, PathBuf)>,
    pub constants: ModelConstants,
    /// `None` = resolve from `QI_THREADS` / hardware.
    pub threads: Option<usize>,
    /// Blocks per thread; `None` = 2 x threads.
    pub splits: Option<usize>,
    pub subregion: Option<Region>,
    pub all_residuals: bool,
    pub iterations: bool,
    pub weighted: bool,
    /// Output filename prefix (may include a directory).
    pub out_prefix: String,
    pub verbose: bool,
}

/// Configuration for `qi synth`.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub model: ModelKind,
    pub sequence: Option<PathBuf>,
    pub constants: ModelConstants,
    /// Parameter maps, by varying parameter name.
    pub params: Vec<(String, PathBuf)>,
    pub fixed: Vec<(String, PathBuf)>,
    /// Standard deviation of additive Gaussian noise.
    pub noise: f64,
    pub seed: u64,
    pub out: PathBuf,
    pub threads: Option<usize>,
}

/// Summary file written next to the output maps (`<PREFIX><MODEL>_summary.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub tool: String,
    pub created: DateTime<Local>,
    pub model: ModelKind,
    /// Sequence as loaded (angles in degrees).
    pub sequence: Value,
    /// Resolved run constants, defaults included.
    pub constants: BTreeMap<String, f64>,
    pub parameters: Vec<String>,
    pub threads: usize,
    pub splits_per_thread: usize,
    pub subregion: Option<Region>,
    pub blocks: usize,
    pub voxels_processed: usize,
    pub non_converged: usize,
    /// Voxels with a NaN/infinite residual, excluded from `total_residual`.
    #[serde(default)]
    pub non_finite: usize,
    pub total_residual: f64,
    pub elapsed_seconds: f64,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    /// Mean residual norm over voxels with a finite residual (0 when there are none).
    pub fn mean_residual(&self) -> f64 {
        let counted = self.voxels_processed.saturating_sub(self.non_finite);
        if counted == 0 {
            0.0
        } else {
            self.total_residual / counted as f64
        }
    }
}
