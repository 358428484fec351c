//! Morphological erosion (minimum filter)
//!
//! Replaces each class cell with the smallest class under the structuring
//! element. Shrinks high-valued classes.

use dtclassifier_core::raster::Raster;
use dtclassifier_core::Result;

use super::element::{neighborhood_filter, StructuringElement};

/// Minimum over the structuring element, clipped at the edges and ignoring
/// nodata neighbors
pub fn erode(raster: &Raster<f64>, element: &StructuringElement) -> Result<Raster<f64>> {
    neighborhood_filter(raster, element, |window| {
        window.iter().copied().fold(f64::INFINITY, f64::min)
    })
}
