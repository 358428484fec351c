//! Turning labeled vector geometries into raster samples

mod buffer;
mod extract;

pub use buffer::{buffer_line, buffer_point, buffer_segment, BufferParams};
pub use extract::{extract_samples, ExtractParams, Sample, SampleExtractor};
