//! Structuring elements and the shared neighborhood filter

use dtclassifier_core::raster::Raster;
use dtclassifier_core::{Error, Result};

/// Square structuring element of side `2 * radius + 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    radius: usize,
}

impl Default for StructuringElement {
    fn default() -> Self {
        Self::square(1)
    }
}

impl StructuringElement {
    pub fn square(radius: usize) -> Self {
        Self { radius }
    }

    pub fn validate(&self) -> Result<()> {
        if self.radius == 0 {
            return Err(Error::InvalidParameter {
                name: "radius",
                value: "0".to_string(),
                reason: "structuring element radius must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// (dr, dc) offsets of the cells under the element, center included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius as isize;
        (-r..=r).flat_map(|dr| (-r..=r).map(move |dc| (dr, dc))).collect()
    }
}

/// Replace every valid cell with `reduce` over the valid values under the
/// element.
///
/// The window is clipped at the raster edges and ignores NaN and nodata
/// neighbors; nodata cells keep their value.
pub(crate) fn neighborhood_filter<F>(raster: &Raster<f64>, element: &StructuringElement, mut reduce: F) -> Result<Raster<f64>>
where
    F: FnMut(&mut [f64]) -> f64,
{
    element.validate()?;

    let (rows, cols) = raster.shape();
    let offsets = element.offsets();
    let input = raster.data();
    let is_missing = |v: f64| v.is_nan() || raster.is_nodata(v);

    let mut output = raster.clone();
    let mut window = Vec::with_capacity(offsets.len());
    for ((row, col), out) in output.data_mut().indexed_iter_mut() {
        let center = input[[row, col]];
        if is_missing(center) {
            continue;
        }
        window.clear();
        for &(dr, dc) in &offsets {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let v = input[[nr as usize, nc as usize]];
            if !is_missing(v) {
                window.push(v);
            }
        }
        *out = reduce(&mut window);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_offsets() {
        let offsets = StructuringElement::square(1).offsets();
        assert_eq!(offsets.len(), 9);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(-1, -1)));
        assert!(offsets.contains(&(1, 1)));
        assert_eq!(StructuringElement::square(2).offsets().len(), 25);
    }

    #[test]
    fn test_validate_zero_radius() {
        assert!(StructuringElement::square(0).validate().is_err());
        assert!(StructuringElement::default().validate().is_ok());
    }

    #[test]
    fn test_filter_clips_at_edges() {
        let raster = Raster::from_vec((0..9).map(f64::from).collect(), 3, 3).unwrap();
        let counts = neighborhood_filter(&raster, &StructuringElement::square(1), |w| w.len() as f64).unwrap();
        assert_eq!(counts.get(0, 0).unwrap(), 4.0);
        assert_eq!(counts.get(0, 1).unwrap(), 6.0);
        assert_eq!(counts.get(1, 1).unwrap(), 9.0);
    }

    #[test]
    fn test_filter_skips_nodata() {
        let mut raster = Raster::filled(3, 3, 1.0);
        raster.set_nodata(Some(255.0));
        raster.set(1, 1, 255.0).unwrap();
        let counts = neighborhood_filter(&raster, &StructuringElement::square(1), |w| w.len() as f64).unwrap();
        assert_eq!(counts.get(1, 1).unwrap(), 255.0);
        assert_eq!(counts.get(0, 0).unwrap(), 3.0);
    }
}
