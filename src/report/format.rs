//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the engine and models stay free of presentation concerns
//! - output changes are localized

use crate::domain::{ModelKind, RunSummary};
use crate::models::{ModelConstants, constant_table, parameter_layout};

/// Format the end-of-run summary printed by `qi fit`.
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== qi fit - {} ===\n", summary.model.model_name()));
    out.push_str(&format!("Started: {}\n", summary.created.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!(
        "Threads: {} | blocks: {} ({} per thread)\n",
        summary.threads, summary.blocks, summary.splits_per_thread
    ));
    if let Some(region) = &summary.subregion {
        out.push_str(&format!("Sub-window: start {:?} size {:?}\n", region.start, region.size));
    }
    if !summary.constants.is_empty() {
        let constants: Vec<String> = summary.constants.iter().map(|(k, v)| format!("{k}={v}")).collect();
        out.push_str(&format!("Constants: {}\n", constants.join(", ")));
    }

    out.push_str(&format!(
        "Voxels: {} fitted | {} not converged",
        summary.voxels_processed, summary.non_converged
    ));
    if summary.non_finite > 0 {
        out.push_str(&format!(" | {} non-finite residual", summary.non_finite));
    }
    out.push('\n');
    out.push_str(&format!(
        "Residual: total {:.6e} | mean {:.6e}\n",
        summary.total_residual,
        summary.mean_residual()
    ));
    out.push_str(&format!("Elapsed: {:.3}s\n", summary.elapsed_seconds));

    if !summary.outputs.is_empty() {
        out.push_str("\nOutputs:\n");
        for path in &summary.outputs {
            out.push_str(&format!("  {}\n", path.display()));
        }
    }
    out
}

/// Listing printed by `qi models`.
pub fn format_model_list() -> String {
    let mut out = String::new();
    for kind in ModelKind::ALL {
        out.push_str(&format!("{:<12} {}\n", kind.as_str(), kind.description()));
        let (varying, fixed) = parameter_layout(kind);
        for p in varying {
            out.push_str(&format!(
                "    {:<6} start {:<6} bounds [{}, {}]\n",
                p.name, p.start, p.lower, p.upper
            ));
        }
        for f in fixed {
            out.push_str(&format!("    {:<6} fixed, default {}\n", f.name, f.default));
        }
        let defaults = ModelConstants::new()
            .resolve(kind.model_name(), constant_table(kind))
            .unwrap_or_default();
        let constants: Vec<String> = constant_table(kind)
            .iter()
            .zip(defaults.iter())
            .map(|((name, _), value)| format!("{name}={value}"))
            .collect();
        out.push_str(&format!("    constants: {}\n", constants.join(", ")));
    }
    out
}
