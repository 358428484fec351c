//! Shapefile and GeoPackage layers through OGR

use super::{AttributeType, AttributeValue, Feature, FieldDef, GeometryKind, VectorFormat, VectorLayer};
use crate::crs::CRS;
use crate::error::{Error, Result};
use gdal::errors::GdalError;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType, ToGdal};
use gdal::{Dataset, DriverManager};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Files making up one shapefile
const SHAPEFILE_PARTS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

fn layer_err(path: &Path) -> impl Fn(GdalError) -> Error + '_ {
    move |e| Error::Layer {
        layer: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn driver_name(format: VectorFormat) -> &'static str {
    match format {
        VectorFormat::GeoJson => "GeoJSON",
        VectorFormat::Shapefile => "ESRI Shapefile",
        VectorFormat::GeoPackage => "GPKG",
    }
}

fn attribute_type(field_type: OGRFieldType::Type) -> AttributeType {
    match field_type {
        OGRFieldType::OFTInteger | OGRFieldType::OFTInteger64 => AttributeType::Integer,
        OGRFieldType::OFTReal => AttributeType::Real,
        _ => AttributeType::String,
    }
}

fn field_type(kind: AttributeType) -> OGRFieldType::Type {
    match kind {
        AttributeType::Integer => OGRFieldType::OFTInteger64,
        AttributeType::Real => OGRFieldType::OFTReal,
        AttributeType::Bool => OGRFieldType::OFTInteger,
        AttributeType::String => OGRFieldType::OFTString,
    }
}

fn attribute_value(value: Option<FieldValue>) -> AttributeValue {
    match value {
        None => AttributeValue::Null,
        Some(FieldValue::IntegerValue(v)) => AttributeValue::Int(i64::from(v)),
        Some(FieldValue::Integer64Value(v)) => AttributeValue::Int(v),
        Some(FieldValue::RealValue(v)) => AttributeValue::Float(v),
        Some(FieldValue::StringValue(v)) => AttributeValue::String(v),
        Some(other) => other.into_string().map_or(AttributeValue::Null, AttributeValue::String),
    }
}

fn field_value(value: &AttributeValue) -> Option<FieldValue> {
    match value {
        AttributeValue::Null => None,
        AttributeValue::Bool(v) => Some(FieldValue::IntegerValue(i32::from(*v))),
        AttributeValue::Int(v) => Some(FieldValue::Integer64Value(*v)),
        AttributeValue::Float(v) => Some(FieldValue::RealValue(*v)),
        AttributeValue::String(v) => Some(FieldValue::StringValue(v.clone())),
    }
}

fn geometry_type(kind: GeometryKind) -> OGRwkbGeometryType::Type {
    match kind {
        GeometryKind::Point => OGRwkbGeometryType::wkbPoint,
        GeometryKind::Line => OGRwkbGeometryType::wkbLineString,
        GeometryKind::Polygon => OGRwkbGeometryType::wkbPolygon,
        GeometryKind::Unknown => OGRwkbGeometryType::wkbUnknown,
    }
}

fn crs_of(srs: &SpatialRef) -> Option<CRS> {
    let wkt = srs.to_wkt().ok()?;
    let crs = CRS::from_wkt(wkt);
    Some(match srs.auth_code() {
        Ok(code) => crs.with_epsg(code as u32),
        Err(_) => crs,
    })
}

fn spatial_ref(crs: &CRS) -> Result<SpatialRef> {
    let srs = match (crs.wkt(), crs.epsg()) {
        (Some(wkt), _) => SpatialRef::from_wkt(wkt)?,
        (None, Some(code)) => SpatialRef::from_epsg(code)?,
        (None, None) => return Err(Error::Other(format!("CRS {} has no definition", crs))),
    };
    Ok(srs)
}

/// Read the first layer of an OGR data source
pub fn read_layer(path: &Path) -> Result<VectorLayer> {
    let dataset = Dataset::open(path).map_err(layer_err(path))?;
    let mut layer = dataset.layer(0).map_err(layer_err(path))?;

    let name = layer.name();
    let schema: Vec<FieldDef> = layer
        .defn()
        .fields()
        .map(|field| FieldDef::new(field.name(), attribute_type(field.field_type())))
        .collect();
    let crs = layer.spatial_ref().as_ref().and_then(crs_of);

    let mut kind: Option<GeometryKind> = None;
    let mut features = Vec::new();
    for ogr_feature in layer.features() {
        let geometry = match ogr_feature.geometry() {
            Some(geometry) => Some(geometry.to_geo().map_err(layer_err(path))?),
            None => None,
        };
        if let Some(geometry) = &geometry {
            let k = GeometryKind::of(geometry);
            kind = Some(kind.map_or(k, |prev| prev.merge(k)));
        }
        let properties: HashMap<String, AttributeValue> = ogr_feature
            .fields()
            .map(|(field, value)| (field, attribute_value(value)))
            .collect();
        features.push(Feature {
            geometry,
            properties,
            id: ogr_feature.fid().map(|fid| fid.to_string()),
        });
    }

    debug!(path = %path.display(), features = features.len(), "read OGR layer");
    Ok(VectorLayer::from_parts(
        name,
        kind.unwrap_or(GeometryKind::Unknown),
        schema,
        crs,
        features,
    ))
}

/// Write `layer` with the OGR driver for `format`, replacing existing files
pub fn write_layer(layer: &VectorLayer, path: &Path, format: VectorFormat) -> Result<()> {
    if format == VectorFormat::Shapefile {
        for ext in SHAPEFILE_PARTS {
            let part = path.with_extension(ext);
            if part.exists() {
                std::fs::remove_file(part)?;
            }
        }
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }

    let driver = DriverManager::get_driver_by_name(driver_name(format))?;
    let mut dataset = driver.create_vector_only(path)?;
    let srs = layer.crs().map(spatial_ref).transpose()?;
    let mut ogr_layer = dataset.create_layer(LayerOptions {
        name: layer.name(),
        srs: srs.as_ref(),
        ty: geometry_type(layer.kind()),
        ..Default::default()
    })?;

    let fields: Vec<(&str, OGRFieldType::Type)> = layer
        .schema()
        .iter()
        .map(|field| (field.name.as_str(), field_type(field.kind)))
        .collect();
    ogr_layer.create_defn_fields(&fields)?;

    let mut skipped = 0;
    for feature in layer.features() {
        let Some(geometry) = &feature.geometry else {
            skipped += 1;
            continue;
        };
        let (names, values): (Vec<&str>, Vec<FieldValue>) = layer
            .schema()
            .iter()
            .filter_map(|field| {
                let value = feature.get_property(&field.name).and_then(field_value)?;
                Some((field.name.as_str(), value))
            })
            .unzip();
        ogr_layer.create_feature_fields(geometry.to_gdal()?, &names, &values)?;
    }
    if skipped > 0 {
        debug!(skipped, "features without geometry not written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;
    use tempfile::TempDir;

    #[test]
    fn test_shapefile_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.shp");
        let schema = vec![
            FieldDef::new("class", AttributeType::Integer),
            FieldDef::new("b1", AttributeType::Real),
        ];
        let mut layer = VectorLayer::memory("train", GeometryKind::Point, schema);
        layer.set_crs(Some(CRS::from_epsg(32719)));
        layer
            .append_features(vec![
                Feature::new(point!(x: 1.5, y: 2.5).into())
                    .with_property("class", AttributeValue::Int(1))
                    .with_property("b1", AttributeValue::Float(10.0)),
                Feature::new(point!(x: 3.5, y: 0.5).into())
                    .with_property("class", AttributeValue::Int(0))
                    .with_property("b1", AttributeValue::Float(1.0)),
            ])
            .unwrap();
        write_layer(&layer, &path, VectorFormat::Shapefile).unwrap();

        let loaded = read_layer(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.kind(), GeometryKind::Point);
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(32719));
        let first = loaded.features().next().unwrap();
        assert_eq!(first.get_property("class").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(first.get_property("b1").and_then(|v| v.as_f64()), Some(10.0));
    }
}
