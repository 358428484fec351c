//! Single-band raster grid

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement, RasterGridInfo};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use std::collections::BTreeMap;

/// A georeferenced single-band 2D raster grid.
///
/// Used for classified outputs and their generalized versions. Values are
/// stored row-major as `(row, col)`.
///
/// # Example
///
/// ```ignore
/// use dtclassifier_core::Raster;
///
/// let mut classes: Raster<u8> = Raster::new(100, 100);
/// classes.set(10, 20, 1)?;
/// assert_eq!(classes.get(10, 20)?, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create an empty raster on the grid described by `info`
    pub fn from_grid_info(info: &RasterGridInfo) -> Self {
        let mut raster = Self::new(info.y_size, info.x_size);
        raster.transform = info.transform;
        raster.crs = info.crs.clone();
        raster.nodata = info.nodata.map(T::from_f64);
        raster
    }

    /// Create a raster with the same georeferencing but a different data type
    pub fn with_same_meta<U: RasterElement>(&self) -> Raster<U> {
        Raster {
            data: Array2::zeros(self.data.dim()),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Grid description of this raster (always one band)
    pub fn grid_info(&self) -> RasterGridInfo {
        RasterGridInfo {
            x_size: self.cols(),
            y_size: self.rows(),
            band_count: 1,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata.map(|nd| nd.as_f64()),
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a mutable view of the underlying data
    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, T> {
        self.data.view_mut()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Get a row slice
    pub fn row(&self, row: usize) -> Result<ArrayView1<'_, T>> {
        if row >= self.rows() {
            return Err(Error::IndexOutOfBounds {
                row,
                col: 0,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(self.data.row(row))
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.rows(), self.cols())
    }

    // Comparison and summaries

    /// Number of cells whose value differs from `other`
    pub fn count_differences(&self, other: &Raster<T>) -> Result<usize> {
        if self.shape() != other.shape() {
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar: other.rows(),
                ac: other.cols(),
            });
        }
        let changed = self
            .data
            .iter()
            .zip(other.data.iter())
            .filter(|(a, b)| {
                let (a_nd, b_nd) = (self.is_nodata(**a), other.is_nodata(**b));
                if a_nd || b_nd {
                    a_nd != b_nd
                } else {
                    a != b
                }
            })
            .count();
        Ok(changed)
    }

    /// Cell count per class value (no-data cells excluded)
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }
            *counts.entry(value.as_f64().round() as i64).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<u8> = Raster::new(10, 10);
        raster.set(5, 5, 1).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 1);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_grid_info_roundtrip() {
        let mut info = RasterGridInfo::new(7, 3, 4, GeoTransform::new(10.0, 20.0, 2.0, -2.0));
        info.crs = Some(CRS::from_epsg(32633));
        let raster: Raster<u8> = Raster::from_grid_info(&info);
        let back = raster.grid_info();
        assert_eq!(back.shape(), (3, 7));
        assert_eq!(back.band_count, 1);
        assert_eq!(back.transform, info.transform);
        assert_eq!(back.crs, info.crs);
    }

    #[test]
    fn test_count_differences_and_classes() {
        let a: Raster<u8> = Raster::from_vec(vec![0, 1, 1, 0], 2, 2).unwrap();
        let b: Raster<u8> = Raster::from_vec(vec![0, 0, 1, 0], 2, 2).unwrap();
        assert_eq!(a.count_differences(&b).unwrap(), 1);
        assert_eq!(a.class_counts().get(&1), Some(&2));
        assert_eq!(b.class_counts().get(&0), Some(&3));
    }
}
