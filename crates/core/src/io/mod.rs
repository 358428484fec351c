//! Windowed raster access and GeoTIFF drivers
//!
//! Algorithms only see [`RasterSource`] and [`RasterSink`]. Files are opened
//! through [`open_raster`] / [`create_raster`], which use GDAL when the `gdal`
//! feature is enabled and the built-in GeoTIFF codec otherwise.

#[cfg(feature = "gdal")]
mod gdal_io;
mod native;

#[cfg(feature = "gdal")]
pub use gdal_io::{GdalRasterSink, GdalRasterSource};
pub use native::{GeoTiffSink, GeoTiffSource};

use crate::error::{Error, Result};
use crate::raster::{MultiBandRaster, PixelType, Raster, RasterElement, RasterGridInfo};
use ndarray::{s, Array3, ArrayView2};
use std::ops::Range;
use std::path::Path;

/// Rectangular block of cells, in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl RasterWindow {
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_off,
            col_off,
            rows,
            cols,
        }
    }

    /// A single full-width row
    pub fn row(row: usize, cols: usize) -> Self {
        Self::new(row, 0, 1, cols)
    }

    /// The whole grid
    pub fn full(info: &RasterGridInfo) -> Self {
        Self::new(0, 0, info.y_size, info.x_size)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Fail unless the window lies inside the grid
    pub fn check_within(&self, info: &RasterGridInfo) -> Result<()> {
        let row_end = self.row_off + self.rows;
        let col_end = self.col_off + self.cols;
        if row_end > info.y_size || col_end > info.x_size {
            return Err(Error::IndexOutOfBounds {
                row: row_end.saturating_sub(1),
                col: col_end.saturating_sub(1),
                rows: info.y_size,
                cols: info.x_size,
            });
        }
        Ok(())
    }
}

/// Read access to a georeferenced multi-band raster
pub trait RasterSource {
    fn grid_info(&self) -> &RasterGridInfo;

    /// Read a block of cells for a range of bands (0-indexed).
    ///
    /// The result has shape `(bands.len(), window.rows, window.cols)`.
    fn read_window(&self, bands: Range<usize>, window: RasterWindow) -> Result<Array3<f64>>;
}

/// Write access to a georeferenced raster
pub trait RasterSink {
    fn grid_info(&self) -> RasterGridInfo;

    fn pixel_type(&self) -> PixelType;

    /// Write a block of cells of one band (0-indexed)
    fn write_window(&mut self, band: usize, window: RasterWindow, data: ArrayView2<'_, f64>) -> Result<()>;

    /// Make everything written so far durable
    fn flush(&mut self) -> Result<()>;
}

pub(crate) fn check_bands(info: &RasterGridInfo, bands: &Range<usize>) -> Result<()> {
    if bands.start > bands.end || bands.end > info.band_count {
        return Err(Error::BandMismatch {
            expected: info.band_count,
            actual: bands.end,
        });
    }
    Ok(())
}

pub(crate) fn check_block(window: &RasterWindow, data: &ArrayView2<'_, f64>) -> Result<()> {
    if data.dim() != (window.rows, window.cols) {
        return Err(Error::SizeMismatch {
            er: window.rows,
            ec: window.cols,
            ar: data.nrows(),
            ac: data.ncols(),
        });
    }
    Ok(())
}

impl RasterSource for MultiBandRaster {
    fn grid_info(&self) -> &RasterGridInfo {
        MultiBandRaster::grid_info(self)
    }

    fn read_window(&self, bands: Range<usize>, window: RasterWindow) -> Result<Array3<f64>> {
        let info = MultiBandRaster::grid_info(self);
        check_bands(info, &bands)?;
        window.check_within(info)?;
        Ok(self
            .data()
            .slice(s![
                bands,
                window.row_off..window.row_off + window.rows,
                window.col_off..window.col_off + window.cols
            ])
            .to_owned())
    }
}

impl<T: RasterElement> RasterSink for Raster<T> {
    fn grid_info(&self) -> RasterGridInfo {
        Raster::grid_info(self)
    }

    fn pixel_type(&self) -> PixelType {
        T::PIXEL_TYPE
    }

    fn write_window(&mut self, band: usize, window: RasterWindow, data: ArrayView2<'_, f64>) -> Result<()> {
        if band != 0 {
            return Err(Error::BandMismatch {
                expected: 1,
                actual: band + 1,
            });
        }
        window.check_within(&Raster::grid_info(self))?;
        check_block(&window, &data)?;
        let mut target = self.data_mut().slice_mut(s![
            window.row_off..window.row_off + window.rows,
            window.col_off..window.col_off + window.cols
        ]);
        target.zip_mut_with(&data, |cell, &value| *cell = T::from_f64(value));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Open a raster file for reading.
///
/// Missing files fail with [`Error::InputNotFound`], unreadable ones with
/// [`Error::RasterOpen`].
pub fn open_raster(path: &Path) -> Result<Box<dyn RasterSource>> {
    if !path.exists() {
        return Err(Error::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    #[cfg(feature = "gdal")]
    let source = GdalRasterSource::open(path);
    #[cfg(not(feature = "gdal"))]
    let source = GeoTiffSource::open(path);

    match source {
        Ok(source) => Ok(Box::new(source)),
        Err(e) => Err(Error::RasterOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Create a GeoTIFF on the grid described by `info` (`info.band_count` bands)
pub fn create_raster(path: &Path, info: &RasterGridInfo, pixel_type: PixelType) -> Result<Box<dyn RasterSink>> {
    #[cfg(feature = "gdal")]
    let sink = GdalRasterSink::create(path, info, pixel_type)?;
    #[cfg(not(feature = "gdal"))]
    let sink = GeoTiffSink::create(path, info, pixel_type)?;
    Ok(Box::new(sink))
}

/// Read one band (0-indexed) of a raster file
pub fn read_band(path: &Path, band: usize) -> Result<Raster<f64>> {
    let source = open_raster(path)?;
    let info = source.grid_info().clone();
    let block = source.read_window(band..band + 1, RasterWindow::full(&info))?;
    let mut raster = Raster::from_array(block.index_axis_move(ndarray::Axis(0), 0));
    raster.set_transform(info.transform);
    raster.set_crs(info.crs);
    raster.set_nodata(info.nodata);
    Ok(raster)
}

/// Read every band of a raster file into memory
pub fn read_stack(path: &Path) -> Result<MultiBandRaster> {
    let source = open_raster(path)?;
    let info = source.grid_info().clone();
    let data = source.read_window(0..info.band_count, RasterWindow::full(&info))?;
    let mut stack = MultiBandRaster::from_array(data, info.transform);
    *stack.grid_info_mut() = info;
    Ok(stack)
}

/// Write a single-band raster to a GeoTIFF file, keeping its element type
pub fn write_raster<T: RasterElement>(raster: &Raster<T>, path: &Path) -> Result<()> {
    let info = raster.grid_info();
    let mut sink = create_raster(path, &info, T::PIXEL_TYPE)?;
    let values = raster.data().mapv(|v| v.as_f64());
    sink.write_window(0, RasterWindow::full(&info), values.view())?;
    sink.flush()
}

/// Write every band of a stack to a GeoTIFF file
pub fn write_stack(stack: &MultiBandRaster, path: &Path, pixel_type: PixelType) -> Result<()> {
    let info = stack.grid_info();
    let mut sink = create_raster(path, info, pixel_type)?;
    for band in 0..info.band_count {
        sink.write_window(band, RasterWindow::full(info), stack.band(band)?)?;
    }
    sink.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use ndarray::{array, Array2};

    #[test]
    fn test_window_bounds() {
        let info = RasterGridInfo::new(4, 3, 1, GeoTransform::default());
        assert!(RasterWindow::new(1, 1, 2, 3).check_within(&info).is_ok());
        assert!(RasterWindow::new(2, 0, 2, 1).check_within(&info).is_err());
        assert_eq!(RasterWindow::full(&info), RasterWindow::new(0, 0, 3, 4));
    }

    #[test]
    fn test_multiband_read_window() {
        let stack = MultiBandRaster::from_bands(
            vec![
                array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
                array![[10.0, 20.0, 30.0], [40.0, 50.0, 60.0]],
            ],
            GeoTransform::default(),
        )
        .unwrap();

        let block = stack.read_window(0..2, RasterWindow::new(1, 1, 1, 2)).unwrap();
        assert_eq!(block.dim(), (2, 1, 2));
        assert_eq!(block[[0, 0, 0]], 5.0);
        assert_eq!(block[[1, 0, 1]], 60.0);

        assert!(stack.read_window(0..3, RasterWindow::row(0, 3)).is_err());
    }

    #[test]
    fn test_raster_sink_converts() {
        let mut out: Raster<u8> = Raster::new(2, 2);
        let block = Array2::from_elem((1, 2), 1.6);
        out.write_window(0, RasterWindow::row(1, 2), block.view()).unwrap();
        assert_eq!(out.get(1, 0).unwrap(), 2);
        assert_eq!(out.get(0, 0).unwrap(), 0);
        assert!(out.write_window(1, RasterWindow::row(0, 2), block.view()).is_err());
    }

    #[test]
    fn test_opened_raster_keeps_georeferencing() {
        let dir = tempfile::TempDir::new().unwrap();
        for (pixel_type, nodata) in [
            (PixelType::Byte, 255.0),
            (PixelType::Float32, -3.5),
            (PixelType::Float64, -9999.0),
        ] {
            let path = dir.path().join(format!("geo_{}.tif", pixel_type));
            let mut info = RasterGridInfo::new(10, 10, 1, GeoTransform::new(500.0, 1000.0, 10.0, -10.0));
            info.crs = Some(crate::crs::CRS::from_epsg(25830));
            info.nodata = Some(nodata);
            let mut sink = create_raster(&path, &info, pixel_type).unwrap();
            sink.write_window(0, RasterWindow::row(4, 10), Array2::from_elem((1, 10), 1.0).view())
                .unwrap();
            sink.flush().unwrap();

            let source = open_raster(&path).unwrap();
            let read = source.grid_info();
            assert_eq!(read.transform, info.transform, "{}", pixel_type);
            assert_eq!(read.crs.as_ref().and_then(|c| c.epsg()), Some(25830), "{}", pixel_type);
            assert_eq!(read.nodata, info.nodata, "{}", pixel_type);
            let (x, y) = read.transform.cell_center(4, 2);
            assert_eq!(read.transform.cell_at(x, y).unwrap(), (4, 2));
            let block = source.read_window(0..1, RasterWindow::full(read)).unwrap();
            assert_eq!(block[[0, 4, 2]], 1.0);
            assert_eq!(block[[0, 0, 0]], nodata);
        }
    }

    #[test]
    fn test_open_missing_file() {
        let err = open_raster(Path::new("/nonexistent/stack.tif")).err().unwrap();
        assert!(matches!(err, Error::InputNotFound { .. }));
    }
}
