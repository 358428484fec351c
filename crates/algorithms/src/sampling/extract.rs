//! Geometry-to-pixel sampling
//!
//! Points sample the cell that contains them. Polygons sample every cell
//! whose center lies strictly inside them, scanning the pixel rectangle of
//! the polygon's bounding box. Lines are buffered by half a pixel and then
//! sampled like polygons.

use dtclassifier_core::io::{RasterSource, RasterWindow};
use dtclassifier_core::vector::VectorLayer;
use dtclassifier_core::{RasterGridInfo, Result};
use geo::{BoundingRect, Contains, Coord, Geometry, LineString, MultiPolygon, Point, Rect};
use ndarray::{s, Array3};
use tracing::debug;

use super::buffer::{buffer_line, BufferParams};
use crate::progress::StepContext;

/// One labeled row of the training set
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// One value per band, in band order
    pub values: Vec<f64>,
    pub label: i32,
    /// World coordinate of the sampled cell center
    pub x: f64,
    pub y: f64,
}

/// Parameters for sample extraction
#[derive(Debug, Clone)]
pub struct ExtractParams {
    /// Segments per quarter circle used when buffering lines
    pub quadrant_segments: usize,
    /// Line buffer distance as a fraction of the pixel size
    pub line_buffer_factor: f64,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            quadrant_segments: 5,
            line_buffer_factor: 0.5,
        }
    }
}

/// Reads labeled samples from a raster under vector geometries
pub struct SampleExtractor<'a> {
    source: &'a dyn RasterSource,
    params: ExtractParams,
}

impl<'a> SampleExtractor<'a> {
    pub fn new(source: &'a dyn RasterSource) -> Self {
        Self::with_params(source, ExtractParams::default())
    }

    pub fn with_params(source: &'a dyn RasterSource, params: ExtractParams) -> Self {
        Self { source, params }
    }

    fn info(&self) -> &RasterGridInfo {
        self.source.grid_info()
    }

    /// Sample every feature of a layer with the given label.
    ///
    /// Reports one sub-step per feature and honours cancellation between
    /// features. Features without geometry are skipped.
    pub fn extract_layer(&self, layer: &VectorLayer, label: i32, ctx: &StepContext<'_>) -> Result<Vec<Sample>> {
        let total = layer.len();
        let mut samples = Vec::new();
        for (i, feature) in layer.features().enumerate() {
            ctx.checkpoint()?;
            if let Some(geometry) = &feature.geometry {
                self.extract_geometry(geometry, label, &mut samples)?;
            }
            ctx.sub_step(i + 1, total);
        }
        debug!(
            layer = %layer.name(),
            label,
            features = total,
            samples = samples.len(),
            "extracted samples"
        );
        Ok(samples)
    }

    /// Sample one geometry, appending to `out`
    pub fn extract_geometry(&self, geometry: &Geometry<f64>, label: i32, out: &mut Vec<Sample>) -> Result<()> {
        match geometry {
            Geometry::Point(p) => self.sample_point(p, label, out),
            Geometry::MultiPoint(mp) => mp.iter().try_for_each(|p| self.sample_point(p, label, out)),
            Geometry::Polygon(poly) => self.sample_region(poly, label, out),
            Geometry::MultiPolygon(mp) => mp.iter().try_for_each(|poly| self.sample_region(poly, label, out)),
            Geometry::Rect(rect) => self.sample_region(&rect.to_polygon(), label, out),
            Geometry::Triangle(tri) => self.sample_region(&tri.to_polygon(), label, out),
            Geometry::LineString(line) => self.sample_line(line, label, out),
            Geometry::MultiLineString(ml) => ml.iter().try_for_each(|line| self.sample_line(line, label, out)),
            Geometry::Line(line) => self.sample_line(&LineString::from(vec![line.start, line.end]), label, out),
            Geometry::GeometryCollection(gc) => gc.iter().try_for_each(|g| self.extract_geometry(g, label, out)),
        }
    }

    fn sample_point(&self, point: &Point<f64>, label: i32, out: &mut Vec<Sample>) -> Result<()> {
        let info = self.info();
        let (row, col) = info.transform.cell_at(point.x(), point.y())?;
        if !info.contains_cell(row, col) {
            return Ok(());
        }
        let (row, col) = (row as usize, col as usize);
        let block = self
            .source
            .read_window(0..info.band_count, RasterWindow::new(row, col, 1, 1))?;
        let values = block.slice(s![.., 0, 0]).to_vec();
        if values.iter().any(|&v| info.is_missing(v)) {
            return Ok(());
        }
        let (x, y) = info.transform.cell_center(row, col);
        out.push(Sample { values, label, x, y });
        Ok(())
    }

    fn sample_line(&self, line: &LineString<f64>, label: i32, out: &mut Vec<Sample>) -> Result<()> {
        let params = BufferParams {
            distance: self.info().transform.cell_size() * self.params.line_buffer_factor,
            quadrant_segments: self.params.quadrant_segments,
        };
        let buffered: MultiPolygon<f64> = buffer_line(line, &params);
        self.sample_region(&buffered, label, out)
    }

    /// Sample every cell whose center is strictly inside `region`
    fn sample_region<G>(&self, region: &G, label: i32, out: &mut Vec<Sample>) -> Result<()>
    where
        G: Contains<Point<f64>> + BoundingRect<f64, Output = Option<Rect<f64>>>,
    {
        let Some(bbox) = region.bounding_rect() else {
            return Ok(());
        };
        let Some(window) = self.pixel_window(bbox)? else {
            return Ok(());
        };

        let info = self.info();
        let block: Array3<f64> = self.source.read_window(0..info.band_count, window)?;
        for r in 0..window.rows {
            for c in 0..window.cols {
                let (row, col) = (window.row_off + r, window.col_off + c);
                let (x, y) = info.transform.cell_center(row, col);
                if !region.contains(&Point::new(x, y)) {
                    continue;
                }
                let values = block.slice(s![.., r, c]).to_vec();
                if values.iter().any(|&v| info.is_missing(v)) {
                    continue;
                }
                out.push(Sample { values, label, x, y });
            }
        }
        Ok(())
    }

    /// Pixel rectangle covering a world bounding box, clipped to the grid.
    ///
    /// All four corners are mapped so rotated transforms are covered.
    fn pixel_window(&self, bbox: Rect<f64>) -> Result<Option<RasterWindow>> {
        let info = self.info();
        let (min, max) = (bbox.min(), bbox.max());
        let corners = [
            min,
            max,
            Coord { x: min.x, y: max.y },
            Coord { x: max.x, y: min.y },
        ];

        let mut rows = (i64::MAX, i64::MIN);
        let mut cols = (i64::MAX, i64::MIN);
        for corner in corners {
            let (row, col) = info.transform.map_to_pixel(corner.x, corner.y)?;
            rows = (rows.0.min(row), rows.1.max(row));
            cols = (cols.0.min(col), cols.1.max(col));
        }

        let row_start = rows.0.max(0);
        let col_start = cols.0.max(0);
        let row_end = rows.1.min(info.y_size as i64 - 1);
        let col_end = cols.1.min(info.x_size as i64 - 1);
        if row_start > row_end || col_start > col_end {
            return Ok(None);
        }

        Ok(Some(RasterWindow::new(
            row_start as usize,
            col_start as usize,
            (row_end - row_start + 1) as usize,
            (col_end - col_start + 1) as usize,
        )))
    }
}

/// Convenience wrapper: sample one geometry with default parameters
pub fn extract_samples(source: &dyn RasterSource, geometry: &Geometry<f64>, label: i32) -> Result<Vec<Sample>> {
    let mut out = Vec::new();
    SampleExtractor::new(source).extract_geometry(geometry, label, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtclassifier_core::{Error, GeoTransform, MultiBandRaster};
    use geo::{line_string, point, polygon, Polygon};
    use ndarray::Array2;

    fn samples_inside(polygon: &Polygon<f64>, samples: &[Sample]) -> bool {
        samples.iter().all(|s| polygon.contains(&Point::new(s.x, s.y)))
    }

    /// 4x4 grid, unit cells, origin (0, 4); value = row * 10 + col
    fn grid() -> MultiBandRaster {
        let band = Array2::from_shape_fn((4, 4), |(r, c)| (r * 10 + c) as f64);
        MultiBandRaster::from_bands(vec![band.clone(), band * 2.0], GeoTransform::new(0.0, 4.0, 1.0, -1.0)).unwrap()
    }

    #[test]
    fn test_point_sampling() {
        let raster = grid();
        let samples = extract_samples(&raster, &point!(x: 2.3, y: 1.2).into(), 1).unwrap();
        assert_eq!(samples.len(), 1);
        // y = 1.2 -> row 2, x = 2.3 -> col 2
        assert_eq!(samples[0].values, vec![22.0, 44.0]);
        assert_eq!((samples[0].x, samples[0].y), (2.5, 1.5));
    }

    #[test]
    fn test_point_outside_grid_skipped() {
        let raster = grid();
        let samples = extract_samples(&raster, &point!(x: -0.5, y: 1.0).into(), 1).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_polygon_center_containment() {
        let raster = grid();
        let poly = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0)];
        let samples = extract_samples(&raster, &poly.clone().into(), 1).unwrap();
        assert_eq!(samples.len(), 4);
        assert!(samples_inside(&poly, &samples));
        let mut firsts: Vec<f64> = samples.iter().map(|s| s.values[0]).collect();
        firsts.sort_by(f64::total_cmp);
        assert_eq!(firsts, vec![11.0, 12.0, 21.0, 22.0]);
    }

    #[test]
    fn test_polygon_without_cell_center() {
        let raster = grid();
        let sliver = polygon![(x: 1.1, y: 1.1), (x: 1.4, y: 1.1), (x: 1.4, y: 1.4), (x: 1.1, y: 1.4)];
        assert!(extract_samples(&raster, &sliver.into(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_polygon_partly_outside_is_clipped() {
        let raster = grid();
        let poly = polygon![(x: -5.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 10.0), (x: -5.0, y: 10.0)];
        let samples = extract_samples(&raster, &poly.into(), 0).unwrap();
        // only cell (0, 0) has its center inside
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].values[0], 0.0);
    }

    #[test]
    fn test_line_buffered_by_half_pixel() {
        let raster = grid();
        // runs through the centers of row 1
        let line = line_string![(x: 0.5, y: 2.5), (x: 3.5, y: 2.5)];
        let samples = extract_samples(&raster, &line.into(), 1).unwrap();
        let mut firsts: Vec<f64> = samples.iter().map(|s| s.values[0]).collect();
        firsts.sort_by(f64::total_cmp);
        assert_eq!(firsts, vec![10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_missing_values_skipped() {
        let mut raster = grid();
        raster.set(1, 1, 0, f64::NAN).unwrap();
        raster.grid_info_mut().nodata = Some(11.0);
        let line = line_string![(x: 0.5, y: 2.5), (x: 3.5, y: 2.5)];
        let samples = extract_samples(&raster, &line.into(), 1).unwrap();
        // (1, 0) is NaN in band 1, (1, 1) equals nodata in band 0
        let firsts: Vec<f64> = samples.iter().map(|s| s.values[0]).collect();
        assert_eq!(firsts.len(), 2);
        assert!(!firsts.contains(&10.0) && !firsts.contains(&11.0));
    }

    #[test]
    fn test_singular_transform_is_error() {
        let band = Array2::zeros((2, 2));
        let raster = MultiBandRaster::from_bands(vec![band], GeoTransform::from_gdal([0.0, 1.0, 1.0, 0.0, 1.0, 1.0]))
            .unwrap();
        let err = extract_samples(&raster, &point!(x: 0.5, y: 0.5).into(), 1).unwrap_err();
        assert!(matches!(err, Error::SingularTransform { .. }));
    }

    #[test]
    fn test_multipart_sampled_per_part() {
        let raster = grid();
        let a = polygon![(x: 0.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 4.0), (x: 0.0, y: 4.0)];
        let b = polygon![(x: 3.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 1.0), (x: 3.0, y: 1.0)];
        let mp = geo::MultiPolygon::new(vec![a, b]);
        let samples = extract_samples(&raster, &mp.into(), 0).unwrap();
        let firsts: Vec<f64> = samples.iter().map(|s| s.values[0]).collect();
        assert_eq!(firsts, vec![0.0, 33.0]);
    }
}
