//! Error types for dtclassifier

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dtclassifier operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Cannot open raster {}: {reason}", path.display())]
    RasterOpen { path: PathBuf, reason: String },

    #[error("Degenerate training set: {presence} presence and {absence} absence samples")]
    DegenerateTrainingSet { presence: usize, absence: usize },

    #[error("Singular geotransform (determinant {det:e}), inverse mapping undefined")]
    SingularTransform { det: f64 },

    #[error("Band stacking failed: {0}")]
    MergeFailed(String),

    #[error("Cannot write {}: {reason}", path.display())]
    Writer { path: PathBuf, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band count mismatch: expected {expected}, got {actual}")]
    BandMismatch { expected: usize, actual: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Layer {layer}: {reason}")]
    Layer { layer: String, reason: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

impl Error {
    /// Whether the error only affects an optional artifact and the run can go on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Writer { .. })
    }
}

/// Result type alias for dtclassifier operations
pub type Result<T> = std::result::Result<T, Error>;
