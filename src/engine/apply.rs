//! Parallel per-voxel model application.
//!
//! Flow of one run:
//!
//! 1. validate every volume against the first input's grid and the model
//! 2. build the active set and cut it into blocks
//! 3. allocate zeroed, full-size outputs and carve them into per-block
//!    mutable windows (blocks own disjoint index spans, so no locking)
//! 4. fit every block on a dedicated rayon pool, merging per-block totals
//!    and reporting progress under one mutex
//!
//! Non-converged fits are written like any other; only validation fails a run.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::engine::partition::{Block, active_voxels, partition};
use crate::engine::progress::ProgressObserver;
use crate::error::AppError;
use crate::models::Model;
use crate::volume::{Geometry, Mask, Region, Volume};

/// Run parameters for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOptions {
    /// Worker threads in the pool (>= 1).
    pub threads: usize,
    /// Blocks per thread (>= 1); more blocks smooth out uneven masks.
    pub splits_per_thread: usize,
    pub subregion: Option<Region>,
    /// Also store the per-sample residual vector of every voxel.
    pub all_residuals: bool,
    /// Also store iteration counts and convergence flags.
    pub iterations: bool,
}

impl ApplyOptions {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            splits_per_thread: 2,
            subregion: None,
            all_residuals: false,
            iterations: false,
        }
    }

    pub fn block_count(&self) -> usize {
        self.threads.saturating_mul(self.splits_per_thread)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.threads == 0 {
            return Err(AppError::config("Thread count must be at least 1."));
        }
        if self.splits_per_thread == 0 {
            return Err(AppError::config("Splits per thread must be at least 1."));
        }
        if self.threads.checked_mul(self.splits_per_thread).is_none() {
            return Err(AppError::config(format!(
                "{} threads x {} splits per thread overflows the block count.",
                self.threads, self.splits_per_thread
            )));
        }
        Ok(())
    }
}

/// Volumes taking part in a run.
#[derive(Debug, Clone, Default)]
pub struct ApplyInputs {
    /// Measurement volumes; components are concatenated per voxel in order.
    pub inputs: Vec<Volume>,
    pub mask: Option<Mask>,
    /// Per-voxel values for the model's fixed parameters, by name.
    pub fixed: Vec<(String, Volume)>,
}

impl ApplyInputs {
    pub fn new(inputs: Vec<Volume>) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_fixed(mut self, name: impl Into<String>, volume: Volume) -> Self {
        self.fixed.push((name.into(), volume));
        self
    }
}

/// Run-level totals merged from every block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    /// Sum of per-voxel residual norms.
    pub total_residual: f64,
    pub voxels_processed: usize,
    pub non_converged: usize,
    /// Voxels whose residual was NaN or infinite; left out of `total_residual`.
    pub non_finite: usize,
    pub blocks_completed: usize,
}

impl RunTotals {
    fn merge(&mut self, other: &RunTotals) {
        self.total_residual += other.total_residual;
        self.voxels_processed += other.voxels_processed;
        self.non_converged += other.non_converged;
        self.non_finite += other.non_finite;
        self.blocks_completed += other.blocks_completed;
    }
}

/// Output volumes of a run, all on the input grid.
#[derive(Debug, Clone)]
pub struct OutputSet {
    /// One scalar map per varying parameter, in schema order.
    pub parameters: Vec<(String, Volume)>,
    /// Root-sum-square residual per voxel.
    pub residual: Volume,
    pub iterations: Option<Volume>,
    /// 1 where the fit converged, 0 otherwise (and outside the active set).
    pub converged: Option<Volume>,
    /// `input_size` components per voxel.
    pub all_residuals: Option<Volume>,
}

impl OutputSet {
    fn allocate(geometry: &Geometry, names: &[&str], input_size: usize, options: &ApplyOptions) -> Self {
        let zeros = |components| Volume::zeros(geometry.clone(), components);
        Self {
            parameters: names.iter().map(|n| (n.to_string(), zeros(1))).collect(),
            residual: zeros(1),
            iterations: options.iterations.then(|| zeros(1)),
            converged: options.iterations.then(|| zeros(1)),
            all_residuals: options.all_residuals.then(|| zeros(input_size)),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Volume> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Every output with its file suffix (`M0`, `residual`, ...).
    pub fn named(&self) -> Vec<(&str, &Volume)> {
        let mut out: Vec<(&str, &Volume)> = self.parameters.iter().map(|(n, v)| (n.as_str(), v)).collect();
        out.push(("residual", &self.residual));
        if let Some(v) = &self.all_residuals {
            out.push(("all_residuals", v));
        }
        if let Some(v) = &self.iterations {
            out.push(("iterations", v));
        }
        if let Some(v) = &self.converged {
            out.push(("converged", v));
        }
        out
    }
}

/// Everything a finished run exposes.
#[derive(Debug, Clone)]
pub struct ApplyOutput {
    pub outputs: OutputSet,
    pub totals: RunTotals,
    pub blocks: usize,
    pub elapsed: Duration,
}

/// Source of one fixed value per voxel.
enum FixedSource<'a> {
    Map(&'a Volume),
    Default(f64),
}

impl FixedSource<'_> {
    fn value(&self, index: usize) -> f64 {
        match self {
            FixedSource::Map(v) => v.value(index),
            FixedSource::Default(d) => *d,
        }
    }
}

/// Mutable windows of every output buffer covering one block's span.
struct BlockSink<'a> {
    offset: usize,
    parameters: Vec<&'a mut [f64]>,
    residual: &'a mut [f64],
    iterations: Option<&'a mut [f64]>,
    converged: Option<&'a mut [f64]>,
    all_residuals: Option<&'a mut [f64]>,
    stride: usize,
}

/// Hands out consecutive, non-overlapping windows of one buffer.
struct Carver<'a> {
    rest: &'a mut [f64],
    position: usize,
    stride: usize,
}

impl<'a> Carver<'a> {
    fn new(buffer: &'a mut [f64], stride: usize) -> Self {
        Self {
            rest: buffer,
            position: 0,
            stride,
        }
    }

    /// `span` must start at or after the end of the previous span.
    fn take(&mut self, span: &Range<usize>) -> &'a mut [f64] {
        let rest = std::mem::take(&mut self.rest);
        let (_, tail) = rest.split_at_mut((span.start - self.position) * self.stride);
        let (window, tail) = tail.split_at_mut(span.len() * self.stride);
        self.rest = tail;
        self.position = span.end;
        window
    }
}

/// Applies one model to every active voxel of a set of volumes.
pub struct ApplyEngine<'m> {
    model: &'m dyn Model,
    options: ApplyOptions,
}

impl<'m> ApplyEngine<'m> {
    pub fn new(model: &'m dyn Model, options: ApplyOptions) -> Result<Self, AppError> {
        options.validate()?;
        Ok(Self { model, options })
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Fit every active voxel and return the populated outputs.
    pub fn run(&self, inputs: &ApplyInputs, progress: Option<&dyn ProgressObserver>) -> Result<ApplyOutput, AppError> {
        let started = Instant::now();
        let model = self.model;
        let geometry = self.validate(inputs)?;
        let fixed_sources = self.fixed_sources(inputs)?;
        let region = self.options.subregion.unwrap_or_else(|| geometry.full_region());
        let input_size = model.input_size();

        let active = active_voxels(&geometry, inputs.mask.as_ref(), &region);
        let active_count = active.len();
        let blocks = partition(active, self.options.block_count());
        let block_total = blocks.len();
        debug!(
            model = model.name(),
            active = active_count,
            blocks = block_total,
            threads = self.options.threads,
            "partitioned volume"
        );

        let names = model.schema().varying_names();
        let mut outputs = OutputSet::allocate(&geometry, &names, input_size, &self.options);
        let totals = Mutex::new(RunTotals::default());

        {
            let work = carve_blocks(blocks, &mut outputs, input_size);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.threads)
                .build()
                .map_err(|e| AppError::runtime(format!("Failed to start worker pool: {e}")))?;

            pool.install(|| {
                work.into_par_iter().for_each(|(block, mut sink)| {
                    let local = fit_block(model, &inputs.inputs, &fixed_sources, &block, &mut sink);
                    let mut merged = totals.lock().unwrap_or_else(PoisonError::into_inner);
                    merged.merge(&local);
                    if let Some(observer) = progress {
                        observer.block_completed(merged.blocks_completed as f64 / block_total as f64);
                    }
                });
            });
        }

        let totals = totals.into_inner().unwrap_or_else(PoisonError::into_inner);
        let elapsed = started.elapsed();
        info!(
            model = model.name(),
            voxels = totals.voxels_processed,
            non_converged = totals.non_converged,
            non_finite = totals.non_finite,
            total_residual = totals.total_residual,
            elapsed_ms = elapsed.as_millis() as u64,
            "fit complete"
        );

        Ok(ApplyOutput {
            outputs,
            totals,
            blocks: block_total,
            elapsed,
        })
    }

    /// Check every volume against the reference grid; returns that grid.
    fn validate(&self, inputs: &ApplyInputs) -> Result<Geometry, AppError> {
        let Some(first) = inputs.inputs.first() else {
            return Err(AppError::config("At least one input volume is required."));
        };
        let geometry = first.geometry().clone();

        for (i, input) in inputs.inputs.iter().enumerate().skip(1) {
            geometry.ensure_same_grid(input.geometry(), &format!("Input {}", i + 1))?;
        }
        let samples: usize = inputs.inputs.iter().map(Volume::components).sum();
        if samples != self.model.input_size() {
            return Err(AppError::geometry(format!(
                "Inputs provide {samples} samples per voxel but model {} expects {}",
                self.model.name(),
                self.model.input_size()
            )));
        }
        if let Some(mask) = &inputs.mask {
            geometry.ensure_same_grid(mask.geometry(), "Mask")?;
        }
        for (name, volume) in &inputs.fixed {
            geometry.ensure_same_grid(volume.geometry(), &format!("Fixed map {name}"))?;
            if volume.components() != 1 {
                return Err(AppError::geometry(format!(
                    "Fixed map {name} must be scalar, got {} components per voxel",
                    volume.components()
                )));
            }
        }
        if let Some(region) = &self.options.subregion {
            region.validate(&geometry)?;
        }
        Ok(geometry)
    }

    fn fixed_sources<'a>(&self, inputs: &'a ApplyInputs) -> Result<Vec<FixedSource<'a>>, AppError> {
        let schema = self.model.schema();
        if let Some((name, _)) = inputs.fixed.iter().find(|(n, _)| schema.fixed_index(n).is_none()) {
            return Err(AppError::config(format!(
                "Model {} has no fixed parameter '{name}' (known: {})",
                self.model.name(),
                schema.fixed_names().join(", ")
            )));
        }
        for (i, (name, _)) in inputs.fixed.iter().enumerate() {
            if inputs.fixed[..i].iter().any(|(n, _)| n == name) {
                return Err(AppError::config(format!("Fixed map '{name}' was given more than once")));
            }
        }
        Ok(schema
            .fixed()
            .iter()
            .map(|spec| match inputs.fixed.iter().find(|(n, _)| n == spec.name) {
                Some((_, volume)) => FixedSource::Map(volume),
                None => FixedSource::Default(spec.default),
            })
            .collect())
    }
}

/// Pair each block with its output windows.
fn carve_blocks<'a>(blocks: Vec<Block>, outputs: &'a mut OutputSet, input_size: usize) -> Vec<(Block, BlockSink<'a>)> {
    let mut parameters: Vec<Carver<'a>> = outputs
        .parameters
        .iter_mut()
        .map(|(_, v)| Carver::new(v.data_mut(), 1))
        .collect();
    let mut residual = Carver::new(outputs.residual.data_mut(), 1);
    let mut iterations = outputs.iterations.as_mut().map(|v| Carver::new(v.data_mut(), 1));
    let mut converged = outputs.converged.as_mut().map(|v| Carver::new(v.data_mut(), 1));
    let mut all_residuals = outputs
        .all_residuals
        .as_mut()
        .map(|v| Carver::new(v.data_mut(), input_size));

    blocks
        .into_iter()
        .map(|block| {
            let span = block.span();
            let sink = BlockSink {
                offset: span.start,
                parameters: parameters.iter_mut().map(|c| c.take(&span)).collect(),
                residual: residual.take(&span),
                iterations: iterations.as_mut().map(|c| c.take(&span)),
                converged: converged.as_mut().map(|c| c.take(&span)),
                all_residuals: all_residuals.as_mut().map(|c| c.take(&span)),
                stride: input_size,
            };
            (block, sink)
        })
        .collect()
}

/// Fit one block sequentially, returning its local totals.
fn fit_block(
    model: &dyn Model,
    inputs: &[Volume],
    fixed_sources: &[FixedSource<'_>],
    block: &Block,
    sink: &mut BlockSink<'_>,
) -> RunTotals {
    let mut local = RunTotals {
        blocks_completed: 1,
        ..RunTotals::default()
    };
    let mut measured = Vec::with_capacity(model.input_size());
    let mut fixed = Vec::with_capacity(fixed_sources.len());

    for &index in &block.voxels {
        measured.clear();
        for volume in inputs {
            measured.extend_from_slice(volume.voxel(index));
        }
        fixed.clear();
        fixed.extend(fixed_sources.iter().map(|s| s.value(index)));

        let outcome = model.fit(&measured, &fixed);
        let at = index - sink.offset;

        for (out, value) in sink.parameters.iter_mut().zip(outcome.varying.iter()) {
            out[at] = *value;
        }
        sink.residual[at] = outcome.residual;
        if let Some(out) = sink.iterations.as_deref_mut() {
            out[at] = outcome.iterations as f64;
        }
        if let Some(out) = sink.converged.as_deref_mut() {
            out[at] = if outcome.converged { 1.0 } else { 0.0 };
        }
        if let Some(out) = sink.all_residuals.as_deref_mut() {
            let start = at * sink.stride;
            out[start..start + sink.stride].copy_from_slice(&outcome.residuals);
        }

        if outcome.residual.is_finite() {
            local.total_residual += outcome.residual;
        } else {
            local.non_finite += 1;
        }
        local.voxels_processed += 1;
        if !outcome.converged {
            local.non_converged += 1;
            trace!(voxel = index, iterations = outcome.iterations, "fit did not converge");
        }
    }
    local
}
