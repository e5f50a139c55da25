//! Grid geometry and sub-windows.
//!
//! Linear voxel indices run x-fastest: `idx = i + j*nx + k*nx*ny`, the same
//! ordering NIfTI and ITK use on disk. Every volume taking part in a run must
//! share the same `dims`; spacing/origin/direction travel along so outputs can
//! be written with the geometry of their inputs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const IDENTITY_DIRECTION: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Shape and physical placement of a 3-D voxel grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub dims: [usize; 3],
    /// Voxel sizes in mm.
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// Row-major 3x3 direction cosines.
    pub direction: [f64; 9],
}

impl Geometry {
    /// Unit-spaced grid at the origin with identity orientation.
    pub fn new(dims: [usize; 3]) -> Self {
        Self {
            dims,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: IDENTITY_DIRECTION,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn linear_index(&self, ijk: [usize; 3]) -> usize {
        ijk[0] + ijk[1] * self.dims[0] + ijk[2] * self.dims[0] * self.dims[1]
    }

    pub fn ijk(&self, index: usize) -> [usize; 3] {
        let nx = self.dims[0];
        let nxy = nx * self.dims[1];
        [index % nx, (index / nx) % self.dims[1], index / nxy]
    }

    /// Only the voxel index space has to agree; metadata may differ slightly
    /// between files written by different tools.
    pub fn same_grid(&self, other: &Geometry) -> bool {
        self.dims == other.dims
    }

    /// Fail with a geometry mismatch unless `other` shares this grid.
    pub fn ensure_same_grid(&self, other: &Geometry, what: &str) -> Result<(), AppError> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(AppError::geometry(format!(
                "{what} has dimensions {:?} but the reference grid is {:?}",
                other.dims, self.dims
            )))
        }
    }

    /// The whole grid as a region.
    pub fn full_region(&self) -> Region {
        Region {
            start: [0; 3],
            size: self.dims,
        }
    }
}

/// Axis-aligned sub-window: a start voxel plus an extent per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

impl Region {
    pub fn new(start: [usize; 3], size: [usize; 3]) -> Self {
        Self { start, size }
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }

    pub fn contains(&self, ijk: [usize; 3]) -> bool {
        (0..3).all(|a| ijk[a] >= self.start[a] && ijk[a] < self.start[a] + self.size[a])
    }

    /// Reject windows that reach outside the grid.
    pub fn validate(&self, geometry: &Geometry) -> Result<(), AppError> {
        for axis in 0..3 {
            let end = self.start[axis].checked_add(self.size[axis]);
            match end {
                Some(end) if end <= geometry.dims[axis] => {}
                _ => {
                    return Err(AppError::geometry(format!(
                        "Sub-window start {:?} size {:?} exceeds volume dimensions {:?} on axis {axis}",
                        self.start, self.size, geometry.dims
                    )));
                }
            }
        }
        Ok(())
    }

    /// Linear indices of the window in ascending order.
    ///
    /// The caller must have validated the region against `geometry`.
    pub fn linear_indices<'a>(&'a self, geometry: &'a Geometry) -> impl Iterator<Item = usize> + 'a {
        let [x0, y0, z0] = self.start;
        let [sx, sy, sz] = self.size;
        (z0..z0 + sz).flat_map(move |k| {
            (y0..y0 + sy).flat_map(move |j| {
                let row = geometry.linear_index([x0, j, k]);
                row..row + sx
            })
        })
    }
}

/// Parses `I,J,K,SI,SJ,SK` (start voxel then extent).
impl FromStr for Region {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<usize> = s
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::config(format!("Invalid sub-window '{s}': {e}")))?;
        if values.len() != 6 {
            return Err(AppError::config(format!(
                "Invalid sub-window '{s}': expected I,J,K,SI,SJ,SK (6 values), got {}",
                values.len()
            )));
        }
        Ok(Region {
            start: [values[0], values[1], values[2]],
            size: [values[3], values[4], values[5]],
        })
    }
}
