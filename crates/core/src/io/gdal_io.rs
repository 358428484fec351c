//! Raster access through GDAL

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{check_bands, check_block, RasterSink, RasterSource, RasterWindow};
use crate::raster::{GeoTransform, PixelType, RasterGridInfo};
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::{Array3, ArrayView2};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Any raster format GDAL can open, read window by window
pub struct GdalRasterSource {
    dataset: Dataset,
    info: RasterGridInfo,
}

impl GdalRasterSource {
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let (cols, rows) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;

        let transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default();
        let mut info = RasterGridInfo::new(cols, rows, band_count, transform);

        if let Ok(srs) = dataset.spatial_ref() {
            if let Ok(wkt) = srs.to_wkt() {
                let mut crs = CRS::from_wkt(wkt);
                if let Ok(code) = srs.auth_code() {
                    crs = crs.with_epsg(code as u32);
                }
                info.crs = Some(crs);
            }
        }
        if band_count > 0 {
            info.nodata = dataset.rasterband(1)?.no_data_value();
        }

        Ok(Self { dataset, info })
    }
}

impl RasterSource for GdalRasterSource {
    fn grid_info(&self) -> &RasterGridInfo {
        &self.info
    }

    fn read_window(&self, bands: Range<usize>, window: RasterWindow) -> Result<Array3<f64>> {
        check_bands(&self.info, &bands)?;
        window.check_within(&self.info)?;

        let mut out = Array3::zeros((bands.len(), window.rows, window.cols));
        for (i, band) in bands.enumerate() {
            let rasterband = self.dataset.rasterband((band + 1) as _)?;
            let buffer = rasterband.read_as::<f64>(
                (window.col_off as isize, window.row_off as isize),
                (window.cols, window.rows),
                (window.cols, window.rows),
                None,
            )?;
            for (cell, &value) in out.index_axis_mut(ndarray::Axis(0), i).iter_mut().zip(buffer.data()) {
                *cell = value;
            }
        }
        Ok(out)
    }
}

/// GeoTIFF written through the GDAL GTiff driver
pub struct GdalRasterSink {
    path: PathBuf,
    dataset: Option<Dataset>,
    info: RasterGridInfo,
    pixel_type: PixelType,
}

fn create_dataset<T: GdalType>(path: &Path, info: &RasterGridInfo) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    Ok(driver.create_with_band_type::<T, _>(
        path,
        info.x_size as _,
        info.y_size as _,
        info.band_count as _,
    )?)
}

impl GdalRasterSink {
    pub fn create(path: &Path, info: &RasterGridInfo, pixel_type: PixelType) -> Result<Self> {
        let dataset = match pixel_type {
            PixelType::Byte => create_dataset::<u8>(path, info),
            PixelType::Int32 => create_dataset::<i32>(path, info),
            PixelType::Float32 => create_dataset::<f32>(path, info),
            PixelType::Float64 => create_dataset::<f64>(path, info),
        };
        let mut dataset = dataset.map_err(|e| Error::Writer {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        dataset.set_geo_transform(&info.transform.to_gdal())?;
        if let Some(crs) = &info.crs {
            if let Some(wkt) = crs.wkt() {
                dataset.set_spatial_ref(&SpatialRef::from_wkt(wkt)?)?;
            } else if let Some(code) = crs.epsg() {
                dataset.set_spatial_ref(&SpatialRef::from_epsg(code)?)?;
            }
        }

        let nodata = info.nodata.unwrap_or_else(|| pixel_type.nodata());
        for band in 1..=info.band_count {
            dataset.rasterband(band as _)?.set_no_data_value(Some(nodata))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            dataset: Some(dataset),
            info: info.clone(),
            pixel_type,
        })
    }
}

impl RasterSink for GdalRasterSink {
    fn grid_info(&self) -> RasterGridInfo {
        self.info.clone()
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn write_window(&mut self, band: usize, window: RasterWindow, data: ArrayView2<'_, f64>) -> Result<()> {
        check_bands(&self.info, &(band..band + 1))?;
        window.check_within(&self.info)?;
        check_block(&window, &data)?;

        let dataset = self.dataset.as_ref().ok_or_else(|| Error::Writer {
            path: self.path.clone(),
            reason: "dataset already closed".into(),
        })?;
        let mut rasterband = dataset.rasterband((band + 1) as _)?;
        let mut buffer = Buffer::new((window.cols, window.rows), data.iter().copied().collect());
        rasterband.write(
            (window.col_off as isize, window.row_off as isize),
            (window.cols, window.rows),
            &mut buffer,
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // closing the dataset writes it out
        self.dataset.take();
        Ok(())
    }
}
