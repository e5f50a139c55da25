//! Scalar and vector-valued volumes.
//!
//! A volume stores `components` values per voxel, interleaved voxel-major
//! (`data[idx * components + c]`), so one voxel's measurement vector is a
//! contiguous slice. 4-D inputs (e.g. one frame per flip angle) are held as a
//! 3-D grid with `components = frames`.

use crate::error::AppError;
use crate::volume::grid::Geometry;

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    geometry: Geometry,
    components: usize,
    data: Vec<f64>,
}

impl Volume {
    /// Build a volume from interleaved data, checking the buffer length.
    pub fn new(geometry: Geometry, components: usize, data: Vec<f64>) -> Result<Self, AppError> {
        if components == 0 {
            return Err(AppError::geometry("Volumes must have at least one component per voxel."));
        }
        let expected = geometry.voxel_count() * components;
        if data.len() != expected {
            return Err(AppError::geometry(format!(
                "Volume data has {} values but dims {:?} x {components} components need {expected}",
                data.len(),
                geometry.dims
            )));
        }
        Ok(Self {
            geometry,
            components,
            data,
        })
    }

    pub fn zeros(geometry: Geometry, components: usize) -> Self {
        let len = geometry.voxel_count() * components.max(1);
        Self {
            geometry,
            components: components.max(1),
            data: vec![0.0; len],
        }
    }

    pub fn scalar(geometry: Geometry, data: Vec<f64>) -> Result<Self, AppError> {
        Self::new(geometry, 1, data)
    }

    /// Scalar volume with every voxel set to `value`.
    pub fn filled(geometry: Geometry, value: f64) -> Self {
        let len = geometry.voxel_count();
        Self {
            geometry,
            components: 1,
            data: vec![value; len],
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn voxel_count(&self) -> usize {
        self.geometry.voxel_count()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// The vector stored at one voxel.
    pub fn voxel(&self, index: usize) -> &[f64] {
        let start = index * self.components;
        &self.data[start..start + self.components]
    }

    /// First component at one voxel (the value of a scalar volume).
    pub fn value(&self, index: usize) -> f64 {
        self.data[index * self.components]
    }

    /// Copy of the sub-window `region` as a standalone volume.
    pub fn crop(&self, region: &crate::volume::Region) -> Result<Volume, AppError> {
        region.validate(&self.geometry)?;
        let mut geometry = self.geometry.clone();
        geometry.dims = region.size;
        let mut data = Vec::with_capacity(region.voxel_count() * self.components);
        for idx in region.linear_indices(&self.geometry) {
            data.extend_from_slice(self.voxel(idx));
        }
        Volume::new(geometry, self.components, data)
    }
}

/// Boolean-interpreted volume: a voxel is included when its value is non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    volume: Volume,
}

impl Mask {
    pub fn from_volume(volume: Volume) -> Result<Self, AppError> {
        if volume.components() != 1 {
            return Err(AppError::geometry(format!(
                "Mask must be a scalar volume, got {} components per voxel",
                volume.components()
            )));
        }
        Ok(Self { volume })
    }

    pub fn from_flags(geometry: Geometry, flags: &[bool]) -> Result<Self, AppError> {
        let data = flags.iter().map(|&f| if f { 1.0 } else { 0.0 }).collect();
        Self::from_volume(Volume::scalar(geometry, data)?)
    }

    pub fn geometry(&self) -> &Geometry {
        self.volume.geometry()
    }

    pub fn includes(&self, index: usize) -> bool {
        let v = self.volume.value(index);
        v != 0.0 && !v.is_nan()
    }

    pub fn included_count(&self) -> usize {
        (0..self.volume.voxel_count()).filter(|&i| self.includes(i)).count()
    }
}
