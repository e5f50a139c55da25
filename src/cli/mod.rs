//! Command-line parsing for the `qi` voxel-wise model fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! engine and model code: everything here is converted into the plain
//! `RunConfig` / `SynthConfig` structs before any work starts.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ModelKind;
use crate::models::ModelConstants;
use crate::volume::Region;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "qi", version, about = "Voxel-wise quantitative MRI model fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a model to every voxel of one or more input volumes.
    Fit(FitArgs),
    /// Simulate a measurement volume from parameter maps.
    Synth(SynthArgs),
    /// List the available models with their parameters and constants.
    Models,
}

/// Options for `qi fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Signal model to fit.
    #[arg(value_enum)]
    pub model: ModelKind,

    /// Input volumes; their samples are concatenated per voxel in the given order.
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Sequence JSON file (read from stdin when omitted).
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Only fit voxels where this volume is non-zero.
    #[arg(short, long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Per-voxel map for a fixed parameter (e.g. `f0=B0.json`, `B1=B1.json`).
    #[arg(long, value_name = "NAME=FILE", value_parser = parse_named_path)]
    pub fixed: Vec<(String, PathBuf)>,

    /// Override a model constant (e.g. `T2=0.05`); repeatable or comma-separated.
    #[arg(long = "const", value_name = "NAME=VALUE")]
    pub constants: Vec<ModelConstants>,

    /// Worker threads (0 = hardware limit). Defaults to $QI_THREADS or the hardware limit.
    #[arg(short = 'T', long)]
    pub threads: Option<usize>,

    /// Blocks per thread (default: 2 x threads).
    #[arg(long)]
    pub splits: Option<usize>,

    /// Only process a sub-window: `I,J,K,SI,SJ,SK` (start voxel then size).
    #[arg(short, long, value_name = "I,J,K,SI,SJ,SK")]
    pub subregion: Option<Region>,

    /// Also write every voxel's residual vector.
    #[arg(short = 'r', long = "all-resids")]
    pub all_residuals: bool,

    /// Also write iteration counts and convergence flags.
    #[arg(short = 'i', long)]
    pub iterations: bool,

    /// Weight samples by their off-resonance sensitivity (SSFP models).
    #[arg(long)]
    pub weighted: bool,

    /// Output filename prefix (may include a directory).
    #[arg(short, long = "out", value_name = "PREFIX", default_value = "")]
    pub out_prefix: String,

    /// Log progress and debug detail.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Options for `qi synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Signal model to simulate.
    #[arg(value_enum)]
    pub model: ModelKind,

    /// Sequence JSON file (read from stdin when omitted).
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Map for a varying parameter (e.g. `T1=T1.json`); one per parameter.
    #[arg(long = "param", visible_alias = "params", value_name = "NAME=FILE", required = true, value_parser = parse_named_path)]
    pub params: Vec<(String, PathBuf)>,

    /// Per-voxel map for a fixed parameter.
    #[arg(long, value_name = "NAME=FILE", value_parser = parse_named_path)]
    pub fixed: Vec<(String, PathBuf)>,

    /// Override a model constant; repeatable or comma-separated.
    #[arg(long = "const", value_name = "NAME=VALUE")]
    pub constants: Vec<ModelConstants>,

    /// Standard deviation of added Gaussian noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output volume file.
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Worker threads (0 = hardware limit).
    #[arg(short = 'T', long)]
    pub threads: Option<usize>,

    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse `NAME=PATH`.
pub fn parse_named_path(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=FILE, got '{s}'")),
    }
}

/// Fold repeated `--const` values into one set (later values win).
pub fn merge_constants(all: &[ModelConstants]) -> ModelConstants {
    all.iter().fold(ModelConstants::new(), |acc, c| acc.merge(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_arguments_parse() {
        let cli = Cli::try_parse_from([
            "qi", "fit", "ssfp", "a.json", "b.json", "--json", "seq.json", "--fixed", "f0=B0.json",
            "--const", "T2=0.05", "--subregion", "1,2,3,4,5,6", "--all-resids", "-T", "4",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model, ModelKind::Ssfp);
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.fixed, vec![("f0".to_string(), PathBuf::from("B0.json"))]);
        assert_eq!(args.subregion, Some(Region::new([1, 2, 3], [4, 5, 6])));
        assert_eq!(args.threads, Some(4));
        assert!(args.all_residuals && !args.iterations);
        assert_eq!(merge_constants(&args.constants), ModelConstants::new().with("T2", 0.05));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(Cli::try_parse_from(["qi", "fit", "ssfp", "a.json", "--fixed", "B0.json"]).is_err());
        assert!(Cli::try_parse_from(["qi", "fit", "ssfp", "a.json", "--subregion", "1,2,3"]).is_err());
        assert!(Cli::try_parse_from(["qi", "fit", "nope", "a.json"]).is_err());
        assert!(Cli::try_parse_from(["qi", "fit", "ssfp"]).is_err());
    }

    #[test]
    fn later_constants_override_earlier_ones() {
        let merged = merge_constants(&[
            "T2=0.05,zeta=0.5".parse().unwrap(),
            "T2=0.07".parse().unwrap(),
        ]);
        assert_eq!(merged, ModelConstants::new().with("T2", 0.07).with("zeta", 0.5));
    }
}
