//! Shared "fit pipeline" logic behind the `qi` subcommands.
//!
//! Keeping this in one place avoids mixing file handling with presentation:
//! sequence JSON -> model -> volumes -> engine -> output maps + summary
//!
//! `app` only resolves configuration and prints.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use crate::domain::{RunConfig, RunSummary, SynthConfig};
use crate::engine::{
    ApplyEngine, ApplyInputs, ApplyOptions, ApplyOutput, LogProgress, ProgressObserver, SimulateInputs,
    simulate,
};
use crate::error::AppError;
use crate::io::{
    output_path, read_mask, read_sequence_json, read_volume, write_outputs, write_summary_json, write_volume,
};
use crate::models::{FitSettings, build_model, constant_table};
use crate::volume::Volume;

/// All computed outputs of a single `qi fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub summary: RunSummary,
    pub output: ApplyOutput,
}

/// Execute `qi fit` with an already-resolved thread count.
pub fn run_fit(config: &RunConfig, threads: usize) -> Result<FitRun, AppError> {
    // 1) Sequence + model: every configuration error surfaces before any volume is read.
    let sequence = read_sequence_json(config.sequence.as_deref())?;
    let settings = FitSettings {
        weighted: config.weighted,
        ..FitSettings::default()
    };
    let model = build_model(config.model, &sequence, &config.constants, settings)?;
    let table = constant_table(config.model);
    let constants = table
        .iter()
        .map(|(name, _)| name.to_string())
        .zip(config.constants.resolve(model.name(), table)?)
        .collect();
    info!(model = model.name(), samples = model.input_size(), "model ready");

    // 2) Volumes.
    let mut inputs = ApplyInputs::new(read_volumes(&config.inputs)?);
    if let Some(path) = &config.mask {
        inputs = inputs.with_mask(read_mask(path)?);
    }
    for (name, volume) in read_named(&config.fixed)? {
        inputs = inputs.with_fixed(name, volume);
    }

    // 3) Fit.
    let options = ApplyOptions {
        threads,
        splits_per_thread: config.splits.unwrap_or(threads.saturating_mul(2)),
        subregion: config.subregion,
        all_residuals: config.all_residuals,
        iterations: config.iterations,
    };
    let engine = ApplyEngine::new(model.as_ref(), options)?;
    let progress = LogProgress::new();
    let observer: Option<&dyn ProgressObserver> = if config.verbose { Some(&progress) } else { None };
    let created = Local::now();
    let output = engine.run(&inputs, observer)?;

    // 4) Outputs.
    let mut outputs = write_outputs(&config.out_prefix, model.name(), &output.outputs)?;
    let summary_path = output_path(&config.out_prefix, model.name(), "summary");
    outputs.push(summary_path.clone());

    let summary = RunSummary {
        tool: "qi".to_string(),
        created,
        model: config.model,
        sequence: model.sequence().to_json(),
        constants,
        parameters: model.schema().varying_names().iter().map(|n| n.to_string()).collect(),
        threads,
        splits_per_thread: engine.options().splits_per_thread,
        subregion: config.subregion,
        blocks: output.blocks,
        voxels_processed: output.totals.voxels_processed,
        non_converged: output.totals.non_converged,
        non_finite: output.totals.non_finite,
        total_residual: output.totals.total_residual,
        elapsed_seconds: output.elapsed.as_secs_f64(),
        outputs,
    };
    write_summary_json(&summary_path, &summary)?;
    debug!(path = %summary_path.display(), "wrote run summary");

    Ok(FitRun { summary, output })
}

/// Execute `qi synth`; returns the written path.
pub fn run_synth(config: &SynthConfig, threads: usize) -> Result<PathBuf, AppError> {
    let sequence = read_sequence_json(config.sequence.as_deref())?;
    let model = build_model(config.model, &sequence, &config.constants, FitSettings::default())?;

    let inputs = SimulateInputs {
        parameters: read_named(&config.params)?,
        fixed: read_named(&config.fixed)?,
        noise: config.noise,
        seed: config.seed,
    };
    let volume = simulate(model.as_ref(), &inputs, threads)?;
    write_volume(&config.out, &volume)?;
    info!(
        model = model.name(),
        voxels = volume.voxel_count(),
        path = %config.out.display(),
        "wrote simulated volume"
    );
    Ok(config.out.clone())
}

fn read_volumes(paths: &[PathBuf]) -> Result<Vec<Volume>, AppError> {
    paths
        .iter()
        .map(|p| {
            let v = read_volume(p)?;
            debug!(path = %p.display(), dims = ?v.geometry().dims, components = v.components(), "loaded volume");
            Ok(v)
        })
        .collect()
}

fn read_named(entries: &[(String, PathBuf)]) -> Result<Vec<(String, Volume)>, AppError> {
    entries
        .iter()
        .map(|(name, path)| Ok((name.clone(), read_volume(Path::new(path))?)))
        .collect()
}
