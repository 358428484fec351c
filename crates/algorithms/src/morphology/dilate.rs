//! Morphological dilation (maximum filter)
//!
//! Replaces each class cell with the largest class under the structuring
//! element. Grows high-valued classes into their neighbors.

use dtclassifier_core::raster::Raster;
use dtclassifier_core::Result;

use super::element::{neighborhood_filter, StructuringElement};

/// Maximum over the structuring element, clipped at the edges and ignoring
/// nodata neighbors
pub fn dilate(raster: &Raster<f64>, element: &StructuringElement) -> Result<Raster<f64>> {
    neighborhood_filter(raster, element, |window| {
        window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtclassifier_core::GeoTransform;

    fn make_raster(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_dilate_uniform() {
        let raster = make_raster(7, 7, 5.0);
        let result = dilate(&raster, &StructuringElement::square(1)).unwrap();
        assert_eq!(result.get(3, 3).unwrap(), 5.0);
        assert_eq!(result.get(0, 0).unwrap(), 5.0);
    }

    #[test]
    fn test_dilate_picks_maximum() {
        let mut raster = make_raster(7, 7, 0.0);
        raster.set(3, 4, 1.0).unwrap();
        let result = dilate(&raster, &StructuringElement::square(1)).unwrap();
        assert_eq!(result.get(3, 3).unwrap(), 1.0);
        assert_eq!(result.get(2, 5).unwrap(), 1.0);
        assert_eq!(result.get(3, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_dilate_keeps_nodata() {
        let mut raster = make_raster(5, 5, 0.0);
        raster.set_nodata(Some(255.0));
        raster.set(2, 2, 255.0).unwrap();
        let result = dilate(&raster, &StructuringElement::square(1)).unwrap();
        assert_eq!(result.get(2, 2).unwrap(), 255.0);
        assert_eq!(result.get(2, 1).unwrap(), 0.0);
    }
}
