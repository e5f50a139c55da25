//! Read/write volume JSON files.
//!
//! A volume file carries the grid geometry plus interleaved voxel data:
//!
//! ```json
//! { "dims": [nx, ny, nz], "spacing": [..], "origin": [..], "direction": [9 values],
//!   "components": 1, "data": [...] }
//! ```
//!
//! `data` is x-fastest, with the `components` values of each voxel adjacent.
//! `spacing`, `origin` and `direction` are optional on input.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::volume::{Geometry, Mask, Volume};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VolumeFile {
    dims: [usize; 3],
    #[serde(default = "unit_spacing")]
    spacing: [f64; 3],
    #[serde(default)]
    origin: [f64; 3],
    #[serde(default = "identity_direction")]
    direction: [f64; 9],
    #[serde(default = "one")]
    components: usize,
    data: Vec<f64>,
}

fn unit_spacing() -> [f64; 3] {
    [1.0; 3]
}

fn identity_direction() -> [f64; 9] {
    Geometry::new([1, 1, 1]).direction
}

fn one() -> usize {
    1
}

/// Read a volume file.
pub fn read_volume(path: &Path) -> Result<Volume, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open volume '{}': {e}", path.display())))?;
    let raw: VolumeFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::io(format!("Invalid volume JSON '{}': {e}", path.display())))?;

    let geometry = Geometry {
        dims: raw.dims,
        spacing: raw.spacing,
        origin: raw.origin,
        direction: raw.direction,
    };
    Volume::new(geometry, raw.components, raw.data)
        .map_err(|e| AppError::new(e.kind(), format!("{}: {}", path.display(), e.message())))
}

/// Read a scalar volume and interpret it as a mask.
pub fn read_mask(path: &Path) -> Result<Mask, AppError> {
    Mask::from_volume(read_volume(path)?)
}

/// Write a volume file (compact JSON).
pub fn write_volume(path: &Path, volume: &Volume) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create volume '{}': {e}", path.display())))?;
    let g = volume.geometry();
    let raw = VolumeFile {
        dims: g.dims,
        spacing: g.spacing,
        origin: g.origin,
        direction: g.direction,
        components: volume.components(),
        data: volume.data().to_vec(),
    };
    serde_json::to_writer(BufWriter::new(file), &raw)
        .map_err(|e| AppError::io(format!("Failed to write volume '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("qi-maps-{}-{name}", std::process::id()))
    }

    #[test]
    fn written_volumes_read_back_identically() {
        let mut geometry = Geometry::new([2, 1, 2]);
        geometry.spacing = [0.5, 0.5, 2.0];
        let volume = Volume::new(geometry, 2, (0..8).map(f64::from).collect()).unwrap();
        let path = temp_path("roundtrip.json");
        write_volume(&path, &volume).unwrap();
        let back = read_volume(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, volume);
    }

    #[test]
    fn optional_geometry_fields_default() {
        let path = temp_path("minimal.json");
        std::fs::write(&path, r#"{"dims": [2, 1, 1], "data": [1.0, 0.0]}"#).unwrap();
        let mask = read_mask(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(mask.included_count(), 1);
        assert_eq!(mask.geometry().spacing, [1.0; 3]);
    }

    #[test]
    fn wrong_data_length_is_a_geometry_error() {
        let path = temp_path("short.json");
        std::fs::write(&path, r#"{"dims": [2, 2, 1], "data": [1.0]}"#).unwrap();
        let err = read_volume(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), ErrorKind::Geometry);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_volume(Path::new("/nonexistent/qi.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
