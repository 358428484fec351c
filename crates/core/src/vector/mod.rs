//! Vector layers: features with geometry and attributes
//!
//! Layers are held in memory. They are read from and written to GeoJSON
//! (see [`geojson`](self::geojson)), and to Shapefile or GeoPackage through
//! OGR when built with the `gdal` feature. Geometries are `geo-types` so the
//! `geo` predicates apply directly.

pub mod geojson;
#[cfg(feature = "gdal")]
pub mod ogr;

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value; strings are parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null => None,
        }
    }

    /// Integer view of the value; floats must be whole
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Declared type of a layer attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    Integer,
    Real,
    String,
    Bool,
}

/// One column of a layer schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: AttributeType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Geometry family of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
    /// Mixed or not yet known
    Unknown,
}

impl GeometryKind {
    /// Family of a single geometry; collections report `Unknown`
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryKind::Line,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryKind::Polygon
            }
            Geometry::GeometryCollection(_) => GeometryKind::Unknown,
        }
    }

    /// Combine the kinds of two features of the same layer
    pub fn merge(self, other: GeometryKind) -> Self {
        if self == other {
            self
        } else {
            GeometryKind::Unknown
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryKind::Point => "Point",
            GeometryKind::Line => "Line",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Builder form of [`Feature::set_property`]
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// On-disk vector formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFormat {
    GeoJson,
    /// ESRI Shapefile (OGR, `gdal` feature)
    Shapefile,
    /// GeoPackage (OGR, `gdal` feature)
    GeoPackage,
}

impl VectorFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "geojson" | "json" => Some(VectorFormat::GeoJson),
            "shp" => Some(VectorFormat::Shapefile),
            "gpkg" => Some(VectorFormat::GeoPackage),
            _ => None,
        }
    }
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VectorFormat::GeoJson => "GeoJSON",
            VectorFormat::Shapefile => "Shapefile",
            VectorFormat::GeoPackage => "GeoPackage",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "gdal")]
fn read_ogr(path: &Path, _format: VectorFormat) -> Result<VectorLayer> {
    ogr::read_layer(path)
}

#[cfg(feature = "gdal")]
fn write_ogr(layer: &VectorLayer, path: &Path, format: VectorFormat) -> Result<()> {
    ogr::write_layer(layer, path, format)
}

#[cfg(not(feature = "gdal"))]
fn ogr_unavailable(path: &Path, format: VectorFormat) -> Error {
    Error::Layer {
        layer: path.display().to_string(),
        reason: format!("{} layers need a build with the `gdal` feature", format),
    }
}

#[cfg(not(feature = "gdal"))]
fn read_ogr(path: &Path, format: VectorFormat) -> Result<VectorLayer> {
    Err(ogr_unavailable(path, format))
}

#[cfg(not(feature = "gdal"))]
fn write_ogr(_layer: &VectorLayer, path: &Path, format: VectorFormat) -> Result<()> {
    Err(ogr_unavailable(path, format))
}

/// Named collection of features sharing a schema
#[derive(Debug, Clone)]
pub struct VectorLayer {
    name: String,
    kind: GeometryKind,
    schema: Vec<FieldDef>,
    crs: Option<CRS>,
    features: Vec<Feature>,
}

impl VectorLayer {
    /// Empty in-memory layer
    pub fn memory(name: impl Into<String>, kind: GeometryKind, schema: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            kind,
            schema,
            crs: None,
            features: Vec::new(),
        }
    }

    /// Read a layer from disk.
    ///
    /// Fails with [`Error::InputNotFound`] when the file does not exist and
    /// with [`Error::Layer`] when it cannot be parsed.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        match VectorFormat::from_path(path) {
            Some(VectorFormat::GeoJson) | None => geojson::read_layer(path),
            Some(format) => read_ogr(path, format),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn schema(&self) -> &[FieldDef] {
        &self.schema
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Features in file order. Can be iterated any number of times.
    pub fn features(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Append features; their geometry family must match the layer's
    pub fn append_features<I>(&mut self, features: I) -> Result<()>
    where
        I: IntoIterator<Item = Feature>,
    {
        for feature in features {
            if let Some(geometry) = &feature.geometry {
                let kind = GeometryKind::of(geometry);
                if self.kind != GeometryKind::Unknown && kind != self.kind {
                    return Err(Error::Layer {
                        layer: self.name.clone(),
                        reason: format!("cannot append {} geometry to a {} layer", kind, self.kind),
                    });
                }
            }
            self.features.push(feature);
        }
        Ok(())
    }

    /// Persist the layer. Any failure is reported as [`Error::Writer`].
    pub fn write_to_file(&self, path: &Path, format: VectorFormat) -> Result<()> {
        let written = match format {
            VectorFormat::GeoJson => geojson::write_layer(self, path),
            VectorFormat::Shapefile | VectorFormat::GeoPackage => write_ogr(self, path, format),
        };
        written.map_err(|e| match e {
            Error::Writer { .. } => e,
            other => Error::Writer {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })
    }

    pub(crate) fn from_parts(
        name: String,
        kind: GeometryKind,
        schema: Vec<FieldDef>,
        crs: Option<CRS>,
        features: Vec<Feature>,
    ) -> Self {
        Self {
            name,
            kind,
            schema,
            crs,
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon};

    #[test]
    fn test_attribute_views() {
        assert_eq!(AttributeValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(AttributeValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(AttributeValue::Float(2.5).as_i64(), None);
        assert_eq!(AttributeValue::String(" 1 ".into()).as_i64(), Some(1));
        assert_eq!(AttributeValue::Null.as_f64(), None);
    }

    #[test]
    fn test_geometry_kind() {
        let p: Geometry<f64> = point!(x: 1.0, y: 2.0).into();
        let l: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        let a: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        assert_eq!(GeometryKind::of(&p), GeometryKind::Point);
        assert_eq!(GeometryKind::of(&l), GeometryKind::Line);
        assert_eq!(GeometryKind::of(&a), GeometryKind::Polygon);
        assert_eq!(GeometryKind::Point.merge(GeometryKind::Polygon), GeometryKind::Unknown);
    }

    #[test]
    fn test_append_checks_kind() {
        let mut layer = VectorLayer::memory("train", GeometryKind::Point, vec![]);
        layer
            .append_features(vec![Feature::new(point!(x: 0.0, y: 0.0).into())])
            .unwrap();
        let line = Feature::new(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into());
        assert!(layer.append_features(vec![line]).is_err());
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(VectorFormat::from_path(Path::new("a.GeoJSON")), Some(VectorFormat::GeoJson));
        assert_eq!(VectorFormat::from_path(Path::new("train_layer.shp")), Some(VectorFormat::Shapefile));
        assert_eq!(VectorFormat::from_path(Path::new("a.gpkg")), Some(VectorFormat::GeoPackage));
        assert_eq!(VectorFormat::from_path(Path::new("a.kml")), None);
    }

    #[cfg(not(feature = "gdal"))]
    #[test]
    fn test_shapefile_needs_gdal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("train_layer.shp");
        std::fs::write(&path, b"").unwrap();
        let err = VectorLayer::open(&path).unwrap_err();
        assert!(matches!(err, Error::Layer { ref reason, .. } if reason.contains("gdal")));

        let layer = VectorLayer::memory("train", GeometryKind::Point, vec![]);
        let err = layer.write_to_file(&path, VectorFormat::Shapefile).unwrap_err();
        assert!(matches!(err, Error::Writer { .. }));
    }

    #[test]
    fn test_write_failure_is_writer_error() {
        let layer = VectorLayer::memory("train", GeometryKind::Point, vec![]);
        let err = layer
            .write_to_file(Path::new("/nonexistent/dir/train.geojson"), VectorFormat::GeoJson)
            .unwrap_err();
        assert!(matches!(err, Error::Writer { .. }));
        assert!(err.is_recoverable());
    }
}
