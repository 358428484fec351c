//! Median filter over a structuring element

use dtclassifier_core::raster::Raster;
use dtclassifier_core::Result;

use super::element::{neighborhood_filter, StructuringElement};

/// Lower median of the valid values under the element.
///
/// With an even number of valid neighbors (at edges or next to nodata) the
/// lower of the two middle values is taken, so class rasters stay integral.
pub fn median(raster: &Raster<f64>, element: &StructuringElement) -> Result<Raster<f64>> {
    neighborhood_filter(raster, element, |window| {
        window.sort_unstable_by(f64::total_cmp);
        window[(window.len() - 1) / 2]
    })
}
