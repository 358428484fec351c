//! Post-classification generalization
//!
//! Removes speckle from a classified raster with a median filter (default) or
//! a dilate, erode, dilate sequence over a square element of side
//! `2 * kernel_size + 1`. The result is written next to the input as
//! `<stem>_generalized.<ext>`.

use dtclassifier_core::io::{create_raster, read_band, RasterWindow};
use dtclassifier_core::raster::Raster;
use dtclassifier_core::{Algorithm, Error, PixelType, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::dilate::dilate;
use super::element::StructuringElement;
use super::erode::erode;
use super::median::median;

/// Smoothing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeneralizeMethod {
    #[default]
    Median,
    DilateErodeDilate,
}

/// Parameters for [`Generalizer`]
#[derive(Debug, Clone)]
pub struct GeneralizeParams {
    /// Radius of the square element
    pub kernel_size: usize,
    pub method: GeneralizeMethod,
    /// Pixel type of the written raster
    pub pixel_type: PixelType,
}

impl Default for GeneralizeParams {
    fn default() -> Self {
        Self {
            kernel_size: 1,
            method: GeneralizeMethod::Median,
            pixel_type: PixelType::Byte,
        }
    }
}

/// Smooth a classified raster in memory
pub fn generalize(raster: &Raster<f64>, kernel_size: usize, method: GeneralizeMethod) -> Result<Raster<f64>> {
    if kernel_size == 0 {
        return Err(Error::InvalidParameter {
            name: "kernel_size",
            value: kernel_size.to_string(),
            reason: "kernel size must be at least 1".to_string(),
        });
    }
    let element = StructuringElement::square(kernel_size);
    match method {
        GeneralizeMethod::Median => median(raster, &element),
        GeneralizeMethod::DilateErodeDilate => {
            let grown = dilate(raster, &element)?;
            let shrunk = erode(&grown, &element)?;
            dilate(&shrunk, &element)
        }
    }
}

/// `<dir>/<stem>_generalized.<ext>` for a classified raster path
pub fn generalized_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("classified");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_generalized.{}", stem, ext),
        None => format!("{}_generalized", stem),
    };
    path.with_file_name(name)
}

/// Generalization algorithm
#[derive(Debug, Clone, Default)]
pub struct Generalizer;

impl Algorithm for Generalizer {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = GeneralizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Generalize"
    }

    fn description(&self) -> &'static str {
        "Remove speckle from a classified raster"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        generalize(&input, params.kernel_size, params.method)
    }
}

impl Generalizer {
    /// Smooth the first band of the raster at `path` and write the result as
    /// a sibling file, returning its path
    pub fn smooth(&self, path: &Path, params: &GeneralizeParams) -> Result<PathBuf> {
        let raster = read_band(path, 0)?;
        let smoothed = generalize(&raster, params.kernel_size, params.method)?;
        let changed = raster.count_differences(&smoothed)?;

        let output = generalized_path(path);
        let info = smoothed.grid_info();
        let mut sink = create_raster(&output, &info, params.pixel_type)?;
        sink.write_window(0, RasterWindow::full(&info), smoothed.view())?;
        sink.flush()?;

        info!(
            input = %path.display(),
            output = %output.display(),
            kernel_size = params.kernel_size,
            method = ?params.method,
            changed,
            "generalized classification"
        );
        Ok(output)
    }
}
