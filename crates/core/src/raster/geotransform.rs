//! Affine geotransformation for rasters

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Determinants below this magnitude make the transform non-invertible.
pub const SINGULAR_EPSILON: f64 = 1e-15;

/// Affine transformation coefficients for georeferencing rasters.
///
/// Maps pixel coordinates `(row, col)` to world coordinates `(x, y)`:
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// Pixel coordinates are always passed and returned in `(row, col)` order,
/// world coordinates in `(x, y)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation term applied to the row index in X (usually 0)
    pub row_rotation: f64,
    /// Rotation term applied to the column index in Y (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Forward transform of (possibly fractional) pixel coordinates.
    pub fn pixel_to_map(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// World coordinates of the center of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.pixel_to_map(row as f64 + 0.5, col as f64 + 0.5)
    }

    /// Determinant of the linear part of the transform.
    pub fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// Whether the transform has no rotation terms.
    pub fn is_axis_aligned(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }

    /// Inverse transform returning fractional `(row, col)`.
    ///
    /// Fails with [`Error::SingularTransform`] when the transform cannot be inverted.
    pub fn map_to_pixel_f(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPSILON {
            return Err(Error::SingularTransform { det });
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        if self.is_axis_aligned() {
            return Ok((dy / self.pixel_height, dx / self.pixel_width));
        }

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        Ok((row, col))
    }

    /// Inverse transform rounded to the nearest pixel index (`floor(v + 0.5)`).
    ///
    /// The result may be negative or beyond the grid; callers clip it.
    pub fn map_to_pixel(&self, x: f64, y: f64) -> Result<(i64, i64)> {
        let (row, col) = self.map_to_pixel_f(x, y)?;
        Ok(((row + 0.5).floor() as i64, (col + 0.5).floor() as i64))
    }

    /// Index of the cell containing the world point (`floor` of the inverse).
    pub fn cell_at(&self, x: f64, y: f64) -> Result<(i64, i64)> {
        let (row, col) = self.map_to_pixel_f(x, y)?;
        Ok((row.floor() as i64, col.floor() as i64))
    }

    /// Get the cell size (assumes square pixels and no rotation)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Check if this is a north-up image (no rotation)
    pub fn is_north_up(&self) -> bool {
        self.is_axis_aligned() && self.pixel_height < 0.0
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a grid with the given dimensions
    pub fn bounds(&self, rows: usize, cols: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.pixel_to_map(0.0, 0.0),
            self.pixel_to_map(0.0, cols as f64),
            self.pixel_to_map(rows as f64, 0.0),
            self.pixel_to_map(rows as f64, cols as f64),
        ];

        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_map() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_map(2.0, 3.0);
        assert_relative_eq!(x, 130.0, epsilon = 1e-10);
        assert_relative_eq!(y, 180.0, epsilon = 1e-10);
    }

    #[test]
    fn test_roundtrip_north_up() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        for row in 0..20 {
            for col in 0..20 {
                let (x, y) = gt.pixel_to_map(row as f64, col as f64);
                assert_eq!(gt.map_to_pixel(x, y).unwrap(), (row, col));
            }
        }
    }

    #[test]
    fn test_roundtrip_rotated() {
        let gt = GeoTransform::from_gdal([500.0, 2.0, 0.5, 900.0, 0.25, -3.0]);
        for row in 0..15 {
            for col in 0..15 {
                let (x, y) = gt.pixel_to_map(row as f64, col as f64);
                assert_eq!(gt.map_to_pixel(x, y).unwrap(), (row, col));
            }
        }
    }

    #[test]
    fn test_map_to_pixel_rounds_to_nearest() {
        let gt = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        // col 0.6 rounds up, row 0.4 rounds down
        assert_eq!(gt.map_to_pixel(0.6, -0.4).unwrap(), (0, 1));
        assert_eq!(gt.map_to_pixel(1.49, -2.5).unwrap(), (3, 1));
        // cell_at truncates to the containing cell instead
        assert_eq!(gt.cell_at(0.6, -0.4).unwrap(), (0, 0));
    }

    #[test]
    fn test_singular_transform_is_error() {
        let gt = GeoTransform::from_gdal([10.0, 0.0, 0.0, 20.0, 0.0, 0.0]);
        match gt.map_to_pixel(10.0, 20.0) {
            Err(Error::SingularTransform { det }) => assert_eq!(det, 0.0),
            other => panic!("expected SingularTransform, got {:?}", other),
        }
        // collinear rotation terms are singular too
        let gt = GeoTransform::from_gdal([0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        assert!(gt.map_to_pixel_f(1.0, 1.0).is_err());
    }

    #[test]
    fn test_cell_center() {
        let gt = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        assert_eq!(gt.cell_center(1, 2), (2.5, 2.5));
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 50);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 50.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }
}
