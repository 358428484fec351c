//! In-memory multi-band raster

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, RasterGridInfo};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

/// A georeferenced stack of `f64` bands sharing one grid.
///
/// Data is laid out as `(band, row, col)`, the shape of a full-window read
/// from any [`RasterSource`](crate::io::RasterSource).
#[derive(Debug, Clone)]
pub struct MultiBandRaster {
    data: Array3<f64>,
    info: RasterGridInfo,
}

impl MultiBandRaster {
    /// Create a zero-filled stack for the given grid
    pub fn new(info: RasterGridInfo) -> Self {
        let data = Array3::zeros((info.band_count, info.y_size, info.x_size));
        Self { data, info }
    }

    /// Build from a `(band, row, col)` array
    pub fn from_array(data: Array3<f64>, transform: GeoTransform) -> Self {
        let (bands, rows, cols) = data.dim();
        let info = RasterGridInfo::new(cols, rows, bands, transform);
        Self { data, info }
    }

    /// Build from equally sized single-band arrays, in band order
    pub fn from_bands(bands: Vec<Array2<f64>>, transform: GeoTransform) -> Result<Self> {
        let Some(first) = bands.first() else {
            return Err(Error::InvalidDimensions { width: 0, height: 0 });
        };
        let (rows, cols) = first.dim();
        let mut data = Array3::zeros((bands.len(), rows, cols));
        for (i, band) in bands.iter().enumerate() {
            if band.dim() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: band.nrows(),
                    ac: band.ncols(),
                });
            }
            data.index_axis_mut(Axis(0), i).assign(band);
        }
        Ok(Self::from_array(data, transform))
    }

    /// Promote a single-band raster
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>) -> Self {
        let band = raster.data().mapv(|v| v.as_f64());
        let data = band.insert_axis(Axis(0));
        Self {
            data,
            info: raster.grid_info(),
        }
    }

    pub fn grid_info(&self) -> &RasterGridInfo {
        &self.info
    }

    pub fn grid_info_mut(&mut self) -> &mut RasterGridInfo {
        &mut self.info
    }

    pub fn band_count(&self) -> usize {
        self.info.band_count
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.info.shape()
    }

    /// View of one band (0-indexed)
    pub fn band(&self, band: usize) -> Result<ArrayView2<'_, f64>> {
        if band >= self.band_count() {
            return Err(Error::BandMismatch {
                expected: self.band_count(),
                actual: band + 1,
            });
        }
        Ok(self.data.index_axis(Axis(0), band))
    }

    /// Set value at (band, row, col)
    pub fn set(&mut self, band: usize, row: usize, col: usize, value: f64) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((band, row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    /// All band values of one pixel
    pub fn pixel(&self, row: usize, col: usize) -> Result<Vec<f64>> {
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            return Err(Error::IndexOutOfBounds { row, col, rows, cols });
        }
        Ok(self.data.slice(s![.., row, col]).to_vec())
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Copy one band out as a single-band raster
    pub fn to_raster(&self, band: usize) -> Result<Raster<f64>> {
        let mut raster = Raster::from_array(self.band(band)?.to_owned());
        raster.set_transform(self.info.transform);
        raster.set_crs(self.info.crs.clone());
        raster.set_nodata(self.info.nodata);
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_bands_order() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[10.0, 20.0], [30.0, 40.0]];
        let stack = MultiBandRaster::from_bands(vec![a, b], GeoTransform::default()).unwrap();
        assert_eq!(stack.band_count(), 2);
        assert_eq!(stack.pixel(1, 0).unwrap(), vec![3.0, 30.0]);
    }

    #[test]
    fn test_from_bands_size_mismatch() {
        let a = Array2::zeros((2, 2));
        let b = Array2::zeros((3, 2));
        assert!(MultiBandRaster::from_bands(vec![a, b], GeoTransform::default()).is_err());
    }

    #[test]
    fn test_to_raster() {
        let mut stack = MultiBandRaster::new(RasterGridInfo::new(3, 2, 2, GeoTransform::default()));
        stack.set(1, 1, 2, 7.5).unwrap();
        let band = stack.to_raster(1).unwrap();
        assert_eq!(band.get(1, 2).unwrap(), 7.5);
        assert!(stack.to_raster(2).is_err());
    }
}
