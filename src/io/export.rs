//! Write run outputs.
//!
//! Every output volume of a run lands in `<PREFIX><MODEL>_<name>.json`; the
//! prefix may contain a directory. A summary JSON with run metadata is
//! written alongside.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::domain::RunSummary;
use crate::engine::OutputSet;
use crate::error::AppError;
use crate::io::volume::write_volume;

/// `<prefix><model>_<suffix>.json`.
pub fn output_path(prefix: &str, model: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}{model}_{suffix}.json"))
}

/// Write every volume in `outputs`; returns the written paths in order.
pub fn write_outputs(prefix: &str, model: &str, outputs: &OutputSet) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::new();
    for (suffix, volume) in outputs.named() {
        let path = output_path(prefix, model, suffix);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io(format!("Failed to create output directory '{}': {e}", parent.display())))?;
        }
        write_volume(&path, volume)?;
        written.push(path);
    }
    Ok(written)
}

/// Write the run summary as pretty JSON.
pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::io(format!("Failed to write summary JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_join_prefix_model_and_suffix() {
        assert_eq!(output_path("out/", "SSFP", "T1"), PathBuf::from("out/SSFP_T1.json"));
        assert_eq!(output_path("", "SSFPMT", "residual"), PathBuf::from("SSFPMT_residual.json"));
        assert_eq!(output_path("sub1_", "SSFP", "M0"), PathBuf::from("sub1_SSFP_M0.json"));
    }
}
