//! Buffer operations
//!
//! Lines are buffered segment by segment: every segment becomes a capsule
//! (a rectangle with two half-disc caps) and the buffered line is the
//! multi-polygon of its capsules. Round caps use `quadrant_segments`
//! vertices per quarter circle.

use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use std::f64::consts::{FRAC_PI_2, PI};

/// Parameters for buffer operations
#[derive(Debug, Clone)]
pub struct BufferParams {
    /// Buffer distance
    pub distance: f64,
    /// Segments per quarter circle (default: 5)
    pub quadrant_segments: usize,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            distance: 1.0,
            quadrant_segments: 5,
        }
    }
}

/// Create a circular buffer around a point.
///
/// The circle has `4 * quadrant_segments` vertices.
pub fn buffer_point(point: &Point<f64>, params: &BufferParams) -> Polygon<f64> {
    let n = (params.quadrant_segments.max(1)) * 4;
    let r = params.distance.abs();
    let (cx, cy) = (point.x(), point.y());

    let coords: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / n as f64;
            (cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect();

    // Polygon::new closes the ring
    Polygon::new(LineString::from(coords), vec![])
}

/// Buffer one segment into a capsule.
///
/// A zero-length segment degenerates to [`buffer_point`].
pub fn buffer_segment(start: Coord<f64>, end: Coord<f64>, params: &BufferParams) -> Polygon<f64> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len = dx.hypot(dy);
    if len == 0.0 {
        return buffer_point(&Point::from(start), params);
    }

    let r = params.distance.abs();
    let half = params.quadrant_segments.max(1) * 2;
    // angle of the left-hand normal
    let normal = dy.atan2(dx) + FRAC_PI_2;

    let mut coords = Vec::with_capacity(2 * (half + 1));
    // cap around `end`, from +normal through the segment direction to -normal
    for k in 0..=half {
        let a = normal - PI * k as f64 / half as f64;
        coords.push((end.x + r * a.cos(), end.y + r * a.sin()));
    }
    // cap around `start`, from -normal back to +normal
    for k in 0..=half {
        let a = normal + PI - PI * k as f64 / half as f64;
        coords.push((start.x + r * a.cos(), start.y + r * a.sin()));
    }

    Polygon::new(LineString::from(coords), vec![])
}

/// Buffer a line string; each segment contributes one capsule
pub fn buffer_line(line: &LineString<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    let coords = &line.0;
    match coords.len() {
        0 => MultiPolygon::new(vec![]),
        1 => MultiPolygon::new(vec![buffer_point(&Point::from(coords[0]), params)]),
        _ => MultiPolygon::new(
            coords
                .windows(2)
                .map(|pair| buffer_segment(pair[0], pair[1], params))
                .collect(),
        ),
    }
}
