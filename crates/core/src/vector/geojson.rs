//! GeoJSON reading and writing of [`VectorLayer`]s

use super::{AttributeType, AttributeValue, Feature, FieldDef, GeometryKind, VectorLayer};
use crate::crs::CRS;
use crate::error::{Error, Result};
use ::geojson::{feature::Id, FeatureCollection, GeoJson, JsonObject, JsonValue};
use geo_types::Geometry;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Read a GeoJSON FeatureCollection (or single Feature) as a layer named
/// after the file stem
pub fn read_layer(path: &Path) -> Result<VectorLayer> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string();
    let text = std::fs::read_to_string(path)?;
    let layer = parse_layer(&name, &text)?;
    debug!(layer = %name, features = layer.len(), kind = %layer.kind(), "read GeoJSON layer");
    Ok(layer)
}

/// Parse GeoJSON text into a layer
pub fn parse_layer(name: &str, text: &str) -> Result<VectorLayer> {
    let layer_err = |reason: String| Error::Layer {
        layer: name.to_string(),
        reason,
    };

    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(g) => FeatureCollection {
            bbox: None,
            features: vec![::geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    };

    let crs = collection.foreign_members.as_ref().and_then(crs_member);

    let mut kind: Option<GeometryKind> = None;
    let mut schema: Vec<FieldDef> = Vec::new();
    let mut features = Vec::with_capacity(collection.features.len());

    for (index, gj) in collection.features.into_iter().enumerate() {
        let geometry = match gj.geometry {
            Some(g) => match Geometry::<f64>::try_from(g) {
                Ok(geom) => Some(geom),
                Err(e) => return Err(layer_err(format!("feature {}: {}", index, e))),
            },
            None => {
                warn!(layer = %name, feature = index, "feature without geometry");
                None
            }
        };
        if let Some(geom) = &geometry {
            let k = GeometryKind::of(geom);
            kind = Some(kind.map_or(k, |prev| prev.merge(k)));
        }

        let mut properties = HashMap::new();
        if let Some(props) = gj.properties {
            for (key, value) in props {
                let value = attribute_from_json(value);
                if let Some(field_kind) = attribute_type(&value) {
                    if !schema.iter().any(|f| f.name == key) {
                        schema.push(FieldDef::new(key.clone(), field_kind));
                    }
                }
                properties.insert(key, value);
            }
        }

        let id = gj.id.map(|id| match id {
            Id::String(s) => s,
            Id::Number(n) => n.to_string(),
        });

        features.push(Feature {
            geometry,
            properties,
            id,
        });
    }

    Ok(VectorLayer::from_parts(
        name.to_string(),
        kind.unwrap_or(GeometryKind::Unknown),
        schema,
        crs,
        features,
    ))
}

/// Serialize a layer as a GeoJSON FeatureCollection
pub fn to_feature_collection(layer: &VectorLayer) -> FeatureCollection {
    let features = layer
        .features()
        .map(|f| {
            let mut properties = JsonObject::new();
            // schema columns first, then anything extra
            for field in layer.schema() {
                if let Some(v) = f.properties.get(&field.name) {
                    properties.insert(field.name.clone(), attribute_to_json(v));
                }
            }
            for (key, v) in &f.properties {
                if !properties.contains_key(key) {
                    properties.insert(key.clone(), attribute_to_json(v));
                }
            }
            ::geojson::Feature {
                bbox: None,
                geometry: f.geometry.as_ref().map(|g| ::geojson::Geometry::new(::geojson::Value::from(g))),
                id: f.id.clone().map(Id::String),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = layer.crs().and_then(|crs| crs.epsg()).map(|code| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", code) }
            }),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Write a layer to a GeoJSON file
pub fn write_layer(layer: &VectorLayer, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(&to_feature_collection(layer))?;
    std::fs::write(path, text).map_err(|e| Error::Writer {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(layer = %layer.name(), features = layer.len(), path = %path.display(), "wrote GeoJSON layer");
    Ok(())
}

fn crs_member(members: &JsonObject) -> Option<CRS> {
    let name = members.get("crs")?.get("properties")?.get("name")?.as_str()?;
    // "EPSG:4326", "urn:ogc:def:crs:EPSG::4326" or "urn:ogc:def:crs:OGC:1.3:CRS84"
    if name.ends_with("CRS84") {
        return Some(CRS::wgs84());
    }
    let upper = name.to_ascii_uppercase();
    let pos = upper.rfind("EPSG:")?;
    let code = name[pos + 5..].trim_start_matches(':');
    code.parse().ok().map(CRS::from_epsg)
}

fn attribute_from_json(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        JsonValue::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Int(i) => JsonValue::from(*i),
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        AttributeValue::String(s) => JsonValue::String(s.clone()),
    }
}

fn attribute_type(value: &AttributeValue) -> Option<AttributeType> {
    match value {
        AttributeValue::Null => None,
        AttributeValue::Bool(_) => Some(AttributeType::Bool),
        AttributeValue::Int(_) => Some(AttributeType::Integer),
        AttributeValue::Float(_) => Some(AttributeType::Real),
        AttributeValue::String(_) => Some(AttributeType::String),
    }
}
