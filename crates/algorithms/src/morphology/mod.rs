//! Morphological smoothing of classified rasters
//!
//! - **Dilation**: maximum filter
//! - **Erosion**: minimum filter
//! - **Median**: lower-median filter
//! - **Generalization**: median or dilate/erode/dilate speckle removal
//!
//! Windows are clipped at the raster edges and skip nodata neighbors.

mod dilate;
mod element;
mod erode;
mod generalize;
mod median;

pub use dilate::dilate;
pub use element::StructuringElement;
pub use erode::erode;
pub use generalize::{generalize, generalized_path, GeneralizeMethod, GeneralizeParams, Generalizer};
pub use median::median;
