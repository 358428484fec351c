//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod grid_info;
mod multiband;

pub use element::RasterElement;
pub use geotransform::{GeoTransform, SINGULAR_EPSILON};
pub use grid::Raster;
pub use grid_info::{PixelType, RasterGridInfo};
pub use multiband::MultiBandRaster;
