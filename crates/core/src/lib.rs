//! # dtclassifier core
//!
//! Core types and I/O for presence/absence raster classification.
//!
//! This crate provides:
//! - `GeoTransform`: affine mapping between `(row, col)` pixel space and world coordinates
//! - `RasterGridInfo`: size, band count, transform and projection of an opened raster
//! - `Raster<T>` / `MultiBandRaster`: in-memory single- and multi-band grids
//! - `RasterSource` / `RasterSink`: windowed raster access (native GeoTIFF or GDAL)
//! - `VectorLayer`: feature layers read from GeoJSON, or Shapefile/GeoPackage with `gdal`
//! - `Error`: the error taxonomy shared by the whole workspace

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, MultiBandRaster, PixelType, Raster, RasterElement, RasterGridInfo};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{RasterSink, RasterSource, RasterWindow};
    pub use crate::raster::{
        GeoTransform, MultiBandRaster, PixelType, Raster, RasterElement, RasterGridInfo,
    };
    pub use crate::vector::{AttributeValue, Feature, GeometryKind, VectorLayer};
    pub use crate::Algorithm;
}

/// Core trait for the raster algorithms of the workspace.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
