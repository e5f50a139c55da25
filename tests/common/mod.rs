//! Common test utilities for qi-maps integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use qi_maps::engine::{SimulateInputs, simulate};
use qi_maps::models::{FitSettings, Model, ModelConstants, SsfpModel};
use qi_maps::sequence::SsfpSequence;
use qi_maps::volume::{Geometry, Mask, Volume};

/// TR 5 ms, FA {5, 10, 15, 20} x PhaseInc {0, 180}.
pub fn ssfp_sequence() -> SsfpSequence {
    SsfpSequence::factorial(0.005, &[5.0, 10.0, 15.0, 20.0], &[0.0, 180.0]).unwrap()
}

pub fn ssfp_model() -> SsfpModel {
    SsfpModel::new(ssfp_sequence(), &ModelConstants::new(), FitSettings::default()).unwrap()
}

/// Smoothly varying (M0, T1, B1) maps inside the model bounds.
pub fn parameter_maps(geometry: &Geometry) -> Vec<(String, Volume)> {
    let n = geometry.voxel_count();
    let map = |f: &dyn Fn(usize) -> f64| Volume::scalar(geometry.clone(), (0..n).map(f).collect()).unwrap();
    vec![
        ("M0".to_string(), map(&|i| 10.0 + (i % 7) as f64 * 3.0)),
        ("T1".to_string(), map(&|i| 0.7 + (i % 5) as f64 * 0.2)),
        ("B1".to_string(), map(&|i| 0.85 + (i % 4) as f64 * 0.08)),
    ]
}

/// Measurement volume simulated from [`parameter_maps`].
pub fn simulated_input(model: &dyn Model, geometry: &Geometry, noise: f64) -> Volume {
    let inputs = SimulateInputs {
        parameters: parameter_maps(geometry),
        noise,
        seed: 1234,
        ..SimulateInputs::default()
    };
    simulate(model, &inputs, 2).unwrap()
}

/// Checkerboard-ish mask excluding roughly a third of the voxels.
pub fn sparse_mask(geometry: &Geometry) -> Mask {
    let flags: Vec<bool> = (0..geometry.voxel_count()).map(|i| (i * 7) % 3 != 0).collect();
    Mask::from_flags(geometry.clone(), &flags).unwrap()
}

/// Compute RMSE between two arrays, only where `include` is set
pub fn rmse(a: &[f64], b: &[f64], include: &[bool]) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for i in 0..a.len() {
        if include[i] {
            let diff = a[i] - b[i];
            sum_sq += diff * diff;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

/// Largest relative difference between two arrays where `include` is set
pub fn max_relative_error(a: &[f64], b: &[f64], include: &[bool]) -> f64 {
    (0..a.len())
        .filter(|&i| include[i])
        .map(|i| (a[i] - b[i]).abs() / b[i].abs().max(1e-12))
        .fold(0.0, f64::max)
}

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("qi-maps-test-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
