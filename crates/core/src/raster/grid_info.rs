//! Grid metadata shared by every raster of a classification run

use super::GeoTransform;
use crate::crs::CRS;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk sample type of a raster band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    /// Unsigned 8-bit (discrete class output)
    Byte,
    /// Signed 32-bit integer
    Int32,
    /// 32-bit float (continuous score output)
    Float32,
    /// 64-bit float
    Float64,
}

impl PixelType {
    /// Value written for cells with no prediction
    pub fn nodata(&self) -> f64 {
        match self {
            PixelType::Byte => u8::MAX as f64,
            PixelType::Int32 => i32::MIN as f64,
            PixelType::Float32 | PixelType::Float64 => f64::NAN,
        }
    }

    /// Bytes per stored sample
    pub fn byte_size(&self) -> usize {
        match self {
            PixelType::Byte => 1,
            PixelType::Int32 | PixelType::Float32 => 4,
            PixelType::Float64 => 8,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelType::Byte => "Byte",
            PixelType::Int32 => "Int32",
            PixelType::Float32 => "Float32",
            PixelType::Float64 => "Float64",
        };
        f.write_str(name)
    }
}

/// Size, band count and georeferencing of a raster.
///
/// Derived once from an opened raster and read-only afterwards. `x_size` is
/// the number of columns, `y_size` the number of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterGridInfo {
    pub x_size: usize,
    pub y_size: usize,
    pub band_count: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

impl RasterGridInfo {
    pub fn new(x_size: usize, y_size: usize, band_count: usize, transform: GeoTransform) -> Self {
        Self {
            x_size,
            y_size,
            band_count,
            transform,
            crs: None,
            nodata: None,
        }
    }

    /// Same grid, different band count (used to describe outputs)
    pub fn with_bands(&self, band_count: usize) -> Self {
        Self {
            band_count,
            ..self.clone()
        }
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.y_size, self.x_size)
    }

    /// Whether the cell index lies inside the grid
    pub fn contains_cell(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.y_size && (col as usize) < self.x_size
    }

    /// Whether a sample value is missing (NaN or equal to the nodata value)
    pub fn is_missing(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.map_or(false, |nd| value == nd)
    }

    /// Check that another grid covers the same cells
    pub fn ensure_same_grid(&self, other: &RasterGridInfo) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::SizeMismatch {
                er: self.y_size,
                ec: self.x_size,
                ar: other.y_size,
                ac: other.x_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_cell() {
        let info = RasterGridInfo::new(4, 3, 1, GeoTransform::default());
        assert!(info.contains_cell(0, 0));
        assert!(info.contains_cell(2, 3));
        assert!(!info.contains_cell(3, 0));
        assert!(!info.contains_cell(0, 4));
        assert!(!info.contains_cell(-1, 0));
    }

    #[test]
    fn test_is_missing() {
        let mut info = RasterGridInfo::new(1, 1, 1, GeoTransform::default());
        assert!(info.is_missing(f64::NAN));
        assert!(!info.is_missing(-9999.0));
        info.nodata = Some(-9999.0);
        assert!(info.is_missing(-9999.0));
    }

    #[test]
    fn test_size_mismatch() {
        let a = RasterGridInfo::new(4, 4, 1, GeoTransform::default());
        let b = RasterGridInfo::new(4, 5, 2, GeoTransform::default());
        assert!(a.ensure_same_grid(&a.with_bands(3)).is_ok());
        assert!(matches!(a.ensure_same_grid(&b), Err(Error::SizeMismatch { .. })));
    }
}
