//! Forward simulation: parameter maps → measurement volume.
//!
//! Used by `qi synth` to build test data. Signals are evaluated in parallel;
//! Gaussian noise is added afterwards from a single seeded generator so the
//! result depends only on the seed, never on the thread count.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;
use tracing::debug;

use crate::error::AppError;
use crate::models::Model;
use crate::volume::Volume;

/// Simulation inputs.
#[derive(Debug, Clone, Default)]
pub struct SimulateInputs {
    /// One scalar map per varying parameter, by name.
    pub parameters: Vec<(String, Volume)>,
    /// Optional fixed-value maps; schema defaults otherwise.
    pub fixed: Vec<(String, Volume)>,
    /// Noise standard deviation (0 = noiseless).
    pub noise: f64,
    pub seed: u64,
}

/// Evaluate `model.signal` at every voxel.
pub fn simulate(model: &dyn Model, inputs: &SimulateInputs, threads: usize) -> Result<Volume, AppError> {
    let schema = model.schema();
    let Some((_, reference)) = inputs.parameters.first() else {
        return Err(AppError::config("At least one parameter map is required."));
    };
    let geometry = reference.geometry().clone();

    for (name, _) in &inputs.parameters {
        if schema.varying_index(name).is_none() {
            return Err(AppError::config(format!(
                "Model {} has no varying parameter '{name}' (known: {})",
                model.name(),
                schema.varying_names().join(", ")
            )));
        }
    }
    for (name, _) in &inputs.fixed {
        if schema.fixed_index(name).is_none() {
            return Err(AppError::config(format!(
                "Model {} has no fixed parameter '{name}' (known: {})",
                model.name(),
                schema.fixed_names().join(", ")
            )));
        }
    }
    for (name, volume) in inputs.parameters.iter().chain(inputs.fixed.iter()) {
        geometry.ensure_same_grid(volume.geometry(), &format!("Map {name}"))?;
        if volume.components() != 1 {
            return Err(AppError::geometry(format!("Map {name} must be scalar")));
        }
    }

    let varying: Vec<&Volume> = schema
        .varying()
        .iter()
        .map(|spec| {
            inputs
                .parameters
                .iter()
                .find(|(n, _)| n == spec.name)
                .map(|(_, v)| v)
                .ok_or_else(|| AppError::config(format!("Missing map for parameter {}", spec.name)))
        })
        .collect::<Result<_, _>>()?;
    let fixed: Vec<Result<&Volume, f64>> = schema
        .fixed()
        .iter()
        .map(|spec| {
            inputs
                .fixed
                .iter()
                .find(|(n, _)| n == spec.name)
                .map(|(_, v)| v)
                .ok_or(spec.default)
        })
        .collect();

    let noise = if inputs.noise > 0.0 {
        Some(
            Normal::new(0.0, inputs.noise)
                .map_err(|e| AppError::config(format!("Invalid noise level {}: {e}", inputs.noise)))?,
        )
    } else if inputs.noise == 0.0 {
        None
    } else {
        return Err(AppError::config(format!("Noise level must be >= 0, got {}", inputs.noise)));
    };

    let size = model.input_size();
    let mut output = Volume::zeros(geometry, size);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| AppError::runtime(format!("Failed to start worker pool: {e}")))?;

    pool.install(|| {
        output
            .data_mut()
            .par_chunks_mut(size)
            .enumerate()
            .for_each(|(index, out)| {
                let p: Vec<f64> = varying.iter().map(|v| v.value(index)).collect();
                let f: Vec<f64> = fixed
                    .iter()
                    .map(|s| match s {
                        Ok(v) => v.value(index),
                        Err(default) => *default,
                    })
                    .collect();
                out.copy_from_slice(&model.signal(&p, &f));
            });
    });

    if let Some(normal) = noise {
        let mut rng = StdRng::seed_from_u64(inputs.seed);
        for value in output.data_mut() {
            *value += normal.sample(&mut rng);
        }
    }
    debug!(model = model.name(), samples = size, noise = inputs.noise, "simulated volume");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FitSettings, ModelConstants, SsfpModel};
    use crate::sequence::SsfpSequence;
    use crate::volume::Geometry;

    fn model() -> SsfpModel {
        let seq = SsfpSequence::factorial(0.005, &[5.0, 10.0], &[0.0, 180.0]).unwrap();
        SsfpModel::new(seq, &ModelConstants::new(), FitSettings::default()).unwrap()
    }

    fn maps(geometry: &Geometry) -> Vec<(String, Volume)> {
        vec![
            ("M0".into(), Volume::filled(geometry.clone(), 20.0)),
            ("T1".into(), Volume::filled(geometry.clone(), 1.2)),
            ("B1".into(), Volume::filled(geometry.clone(), 0.9)),
        ]
    }

    #[test]
    fn noiseless_simulation_matches_signal() {
        let m = model();
        let geometry = Geometry::new([2, 2, 1]);
        let inputs = SimulateInputs {
            parameters: maps(&geometry),
            ..SimulateInputs::default()
        };
        let out = simulate(&m, &inputs, 2).unwrap();
        assert_eq!(out.components(), 4);
        assert_eq!(out.voxel(3), m.signal(&[20.0, 1.2, 0.9], &[0.0]).as_slice());
    }

    #[test]
    fn noise_depends_only_on_seed() {
        let m = model();
        let geometry = Geometry::new([3, 1, 1]);
        let inputs = SimulateInputs {
            parameters: maps(&geometry),
            noise: 0.01,
            seed: 42,
            ..SimulateInputs::default()
        };
        let a = simulate(&m, &inputs, 1).unwrap();
        let b = simulate(&m, &inputs, 3).unwrap();
        assert_eq!(a, b);
        let c = simulate(&m, &SimulateInputs { seed: 7, ..inputs }, 1).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn missing_parameter_map_is_rejected() {
        let m = model();
        let geometry = Geometry::new([1, 1, 1]);
        let mut parameters = maps(&geometry);
        parameters.pop();
        let inputs = SimulateInputs {
            parameters,
            ..SimulateInputs::default()
        };
        let err = simulate(&m, &inputs, 1).unwrap_err();
        assert!(err.message().contains("B1"));
    }
}
