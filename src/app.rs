//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs logging
//! - resolves the worker thread count once
//! - runs the pipeline and prints the report

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, SynthArgs, merge_constants};
use crate::domain::{RunConfig, SynthConfig};
use crate::error::AppError;
use crate::telemetry::init_tracing;

pub mod pipeline;

/// Environment variable consulted when `--threads` is not given.
pub const THREADS_ENV: &str = "QI_THREADS";

/// Entry point for the `qi` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
        Command::Models => {
            print!("{}", crate::report::format_model_list());
            Ok(())
        }
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    init_tracing(args.verbose);
    let config = run_config_from_args(&args);
    let threads = resolve_threads(config.threads)?;
    let run = pipeline::run_fit(&config, threads)?;
    print!("{}", crate::report::format_run_summary(&run.summary));
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    init_tracing(args.verbose);
    let config = synth_config_from_args(&args);
    let threads = resolve_threads(config.threads)?;
    let path = pipeline::run_synth(&config, threads)?;
    println!("Wrote {}", path.display());
    Ok(())
}

pub fn run_config_from_args(args: &FitArgs) -> RunConfig {
    RunConfig {
        model: args.model,
        inputs: args.inputs.clone(),
        sequence: args.json.clone(),
        mask: args.mask.clone(),
        fixed: args.fixed.clone(),
        constants: merge_constants(&args.constants),
        threads: args.threads,
        splits: args.splits,
        subregion: args.subregion,
        all_residuals: args.all_residuals,
        iterations: args.iterations,
        weighted: args.weighted,
        out_prefix: args.out_prefix.clone(),
        verbose: args.verbose,
    }
}

pub fn synth_config_from_args(args: &SynthArgs) -> SynthConfig {
    SynthConfig {
        model: args.model,
        sequence: args.json.clone(),
        constants: merge_constants(&args.constants),
        params: args.params.clone(),
        fixed: args.fixed.clone(),
        noise: args.noise,
        seed: args.seed,
        out: args.out.clone(),
        threads: args.threads,
    }
}

/// Thread count for this process: `--threads`, then `$QI_THREADS` (a `.env`
/// file is honoured), then the hardware limit.
pub fn resolve_threads(explicit: Option<usize>) -> Result<usize, AppError> {
    dotenvy::dotenv().ok();
    let env = std::env::var(THREADS_ENV).ok();
    threads_from(explicit, env.as_deref(), hardware_threads())
}

/// Pure resolution rule behind [`resolve_threads`]; `0` means "hardware".
pub fn threads_from(explicit: Option<usize>, env: Option<&str>, hardware: usize) -> Result<usize, AppError> {
    let requested = match explicit {
        Some(n) => n,
        None => match env.map(str::trim).filter(|v| !v.is_empty()) {
            None => 0,
            Some(v) => v
                .parse::<usize>()
                .map_err(|e| AppError::config(format!("Invalid {THREADS_ENV} value '{v}': {e}")))?,
        },
    };
    Ok(if requested == 0 { hardware.max(1) } else { requested })
}

fn hardware_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_threads_win_over_environment() {
        assert_eq!(threads_from(Some(3), Some("8"), 16).unwrap(), 3);
        assert_eq!(threads_from(Some(0), Some("8"), 16).unwrap(), 16);
    }

    #[test]
    fn environment_then_hardware() {
        assert_eq!(threads_from(None, Some(" 6 "), 16).unwrap(), 6);
        assert_eq!(threads_from(None, Some(""), 16).unwrap(), 16);
        assert_eq!(threads_from(None, None, 0).unwrap(), 1);
        assert!(threads_from(None, Some("many"), 16).is_err());
    }

    #[test]
    fn args_convert_to_run_config() {
        let cli = Cli::try_parse_from(["qi", "fit", "ssfp-mt", "in.json", "--const", "k_f=5", "-o", "out/"]).unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = run_config_from_args(&args);
        assert_eq!(config.out_prefix, "out/");
        assert_eq!(config.threads, None);
        assert_eq!(config.constants.resolve("SSFPMT", crate::models::constant_table(config.model)).unwrap()[1], 5.0);
    }
}
