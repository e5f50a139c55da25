//! Sequence JSON input.
//!
//! The raw object is returned untouched; the model registry turns it into a
//! validated sequence.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde_json::Value;

use crate::error::AppError;

/// Read the sequence object from `path`, or from stdin when `None`.
pub fn read_sequence_json(path: Option<&Path>) -> Result<Value, AppError> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| AppError::io(format!("Failed to open sequence JSON '{}': {e}", path.display())))?;
            parse_sequence(BufReader::new(file), &path.display().to_string())
        }
        None => parse_sequence(std::io::stdin().lock(), "stdin"),
    }
}

fn parse_sequence<R: Read>(reader: R, source: &str) -> Result<Value, AppError> {
    let value: Value = serde_json::from_reader(reader)
        .map_err(|e| AppError::config(format!("Invalid sequence JSON from {source}: {e}")))?;
    if !value.is_object() {
        return Err(AppError::config(format!(
            "Sequence JSON from {source} must be an object of named parameters"
        )));
    }
    Ok(value)
}
