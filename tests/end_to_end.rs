//! File-level runs of the fit and synth pipelines.

mod common;

use std::path::Path;

use qi_maps::app::pipeline::{run_fit, run_synth};
use qi_maps::domain::{ModelKind, RunConfig, RunSummary, SynthConfig};
use qi_maps::error::ErrorKind;
use qi_maps::io::{read_volume, write_volume};
use qi_maps::models::{Model, ModelConstants};
use qi_maps::sequence::Sequence;
use qi_maps::volume::{Geometry, Region, Volume};

use common::*;

fn run_config(dir: &Path, inputs: Vec<std::path::PathBuf>) -> RunConfig {
    RunConfig {
        model: ModelKind::Ssfp,
        inputs,
        sequence: Some(dir.join("sequence.json")),
        mask: None,
        fixed: Vec::new(),
        constants: ModelConstants::new(),
        threads: Some(2),
        splits: None,
        subregion: None,
        all_residuals: false,
        iterations: false,
        weighted: false,
        out_prefix: format!("{}/out/", dir.display()),
        verbose: false,
    }
}

fn write_sequence(dir: &Path) {
    let json = ssfp_sequence().to_json();
    std::fs::write(dir.join("sequence.json"), serde_json::to_string_pretty(&json).unwrap()).unwrap();
}

#[test]
fn single_voxel_fit_recovers_parameters() {
    let model = ssfp_model();
    let truth = [20.0, 1.2, 0.9];
    let outcome = model.fit(&model.signal(&truth, &[0.0]), &[0.0]);

    assert!(outcome.converged);
    for (got, want) in outcome.varying.iter().zip(truth) {
        assert!((got - want).abs() / want < 0.01, "{got} vs {want}");
    }
    assert!(outcome.residual < 1e-6);
}

#[test]
fn fit_writes_maps_and_summary() {
    let dir = scratch_dir("fit");
    write_sequence(&dir);
    let model = ssfp_model();
    let geometry = Geometry::new([4, 3, 2]);
    write_volume(&dir.join("signal.json"), &simulated_input(&model, &geometry, 0.0)).unwrap();

    let mut config = run_config(&dir, vec![dir.join("signal.json")]);
    config.iterations = true;
    let run = run_fit(&config, 2).unwrap();

    assert_eq!(run.summary.voxels_processed, geometry.voxel_count());
    assert_eq!(run.summary.non_converged, 0);
    assert_eq!(run.summary.splits_per_thread, 4);
    assert_eq!(run.summary.parameters, ["M0", "T1", "B1"]);

    for suffix in ["M0", "T1", "B1", "residual", "iterations", "converged", "summary"] {
        let path = dir.join(format!("out/SSFP_{suffix}.json"));
        assert!(path.exists(), "missing {}", path.display());
    }
    assert!(!dir.join("out/SSFP_all_residuals.json").exists());

    let t1 = read_volume(&dir.join("out/SSFP_T1.json")).unwrap();
    assert_eq!(t1.geometry(), &geometry);
    assert_eq!(&t1, run.output.outputs.parameter("T1").unwrap());

    let text = std::fs::read_to_string(dir.join("out/SSFP_summary.json")).unwrap();
    let summary: RunSummary = serde_json::from_str(&text).unwrap();
    assert_eq!(summary.model, ModelKind::Ssfp);
    assert_eq!(summary.constants.get("T2"), Some(&0.1));
    assert_eq!(summary.outputs.len(), 7);
}

#[test]
fn synth_then_fit_round_trips_through_files() {
    let dir = scratch_dir("synth");
    write_sequence(&dir);
    let geometry = Geometry::new([3, 3, 2]);
    let mut params = Vec::new();
    for (name, volume) in parameter_maps(&geometry) {
        let path = dir.join(format!("{name}.json"));
        write_volume(&path, &volume).unwrap();
        params.push((name, path));
    }

    let synth = SynthConfig {
        model: ModelKind::Ssfp,
        sequence: Some(dir.join("sequence.json")),
        constants: ModelConstants::new(),
        params,
        fixed: Vec::new(),
        noise: 0.0,
        seed: 7,
        out: dir.join("synth.json"),
        threads: Some(2),
    };
    let written = run_synth(&synth, 2).unwrap();
    let signal = read_volume(&written).unwrap();
    assert_eq!(signal.components(), 8);

    let mut config = run_config(&dir, vec![written]);
    config.subregion = Some(Region::new([0, 1, 0], [3, 2, 2]));
    let run = run_fit(&config, 3).unwrap();
    assert_eq!(run.summary.voxels_processed, 12);

    let fitted = run.output.outputs.parameter("M0").unwrap();
    let truth = &parameter_maps(&geometry)[0].1;
    let region = config.subregion.unwrap();
    let include: Vec<bool> = (0..geometry.voxel_count()).map(|i| region.contains(geometry.ijk(i))).collect();
    assert!(max_relative_error(fitted.data(), truth.data(), &include) < 0.01);
    for (i, inside) in include.iter().enumerate() {
        if !inside {
            assert_eq!(fitted.value(i), 0.0);
        }
    }
}

#[test]
fn mask_on_another_grid_is_a_geometry_error() {
    let dir = scratch_dir("mask");
    write_sequence(&dir);
    let model = ssfp_model();
    write_volume(&dir.join("signal.json"), &simulated_input(&model, &Geometry::new([2, 2, 2]), 0.0)).unwrap();
    write_volume(&dir.join("mask.json"), &Volume::filled(Geometry::new([2, 2, 3]), 1.0)).unwrap();

    let mut config = run_config(&dir, vec![dir.join("signal.json")]);
    config.mask = Some(dir.join("mask.json"));
    let err = run_fit(&config, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Geometry);
    assert_eq!(err.exit_code(), 3);
    assert!(!dir.join("out").exists());
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = scratch_dir("missing");
    write_sequence(&dir);
    let config = run_config(&dir, vec![dir.join("nope.json")]);
    let err = run_fit(&config, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn unknown_constant_is_rejected_before_reading_volumes() {
    let dir = scratch_dir("const");
    write_sequence(&dir);
    let mut config = run_config(&dir, vec![dir.join("never-read.json")]);
    config.constants = "zeta=0.5".parse().unwrap();
    let err = run_fit(&config, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
