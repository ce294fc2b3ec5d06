use geoingest_types::geojson::{geometries_from_geojson, properties_from_json};
use geoingest_types::Crs;
use geojson::feature::Id;
use serde_json::Value;

use crate::context::DecodeContext;
use crate::error::IngestError;
use crate::input::RawInput;
use crate::layer::GisLayer;
use crate::vector::FeatureCollector;

const CHECKPOINT_INTERVAL: usize = 1024;

pub(crate) fn decode(input: &RawInput, ctx: &DecodeContext) -> Result<GisLayer, IngestError> {
    let bytes: &[u8] = input.bytes();
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| IngestError::Io(format!("invalid JSON: {err}")))?;

    let crs = declared_crs(&value);
    log::debug!("GeoJSON {} uses CRS {crs}", input.name());

    let mut collector = FeatureCollector::new();
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    IngestError::MalformedGeometry("feature collection without features array".into())
                })?;

            for (i, feature) in features.iter().enumerate() {
                if i % CHECKPOINT_INTERVAL == 0 {
                    ctx.checkpoint()?;
                }
                add_feature(&mut collector, feature, i);
            }
        }
        Some("Feature") => add_feature(&mut collector, &value, 0),
        Some(_) => {
            let geometry: geojson::Geometry = serde_json::from_value(value)
                .map_err(|err| IngestError::MalformedGeometry(err.to_string()))?;
            let geometries = geometries_from_geojson(&geometry)
                .map_err(|err| IngestError::MalformedGeometry(err.to_string()))?;
            collector.push_all(geometries, Default::default(), None);
        }
        None => {
            return Err(IngestError::MalformedGeometry(
                "JSON document is not a GeoJSON object".into(),
            ))
        }
    }

    let (features, warning) = collector.finish()?;
    Ok(GisLayer::vector(input.stem(), features, crs).with_warnings(warning))
}

fn add_feature(collector: &mut FeatureCollector, value: &Value, index: usize) {
    let feature: geojson::Feature = match serde_json::from_value(value.clone()) {
        Ok(feature) => feature,
        Err(err) => return collector.reject(format!("feature {index}: {err}")),
    };

    let Some(geometry) = &feature.geometry else {
        return collector.reject(format!("feature {index} has no geometry"));
    };

    let geometries = match geometries_from_geojson(geometry) {
        Ok(geometries) => geometries,
        Err(err) => return collector.reject(format!("feature {index}: {err}")),
    };

    let source_id = feature.id.as_ref().map(|id| match id {
        Id::String(s) => s.clone(),
        Id::Number(n) => n.to_string(),
    });

    collector.push_all(
        geometries,
        properties_from_json(feature.properties.as_ref()),
        source_id.as_deref(),
    );
}

/// CRS given by the legacy (2008) `crs` member. RFC 7946 documents are always WGS84.
fn declared_crs(value: &Value) -> Crs {
    let Some(crs) = value.get("crs") else {
        return Crs::Wgs84;
    };

    let properties = crs.get("properties");
    match crs.get("type").and_then(Value::as_str) {
        Some("name") => properties
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(Crs::from_identifier)
            .unwrap_or_else(|| Crs::Unrecognized(crs.to_string())),
        Some("EPSG") => properties
            .and_then(|p| p.get("code"))
            .and_then(Value::as_u64)
            .and_then(|code| u32::try_from(code).ok())
            .map(Crs::from_epsg)
            .unwrap_or_else(|| Crs::Unrecognized(crs.to_string())),
        _ if crs.is_null() => Crs::Wgs84,
        _ => Crs::Unrecognized(crs.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use geoingest_types::{GeometryType, PropertyValue};
    use serde_json::json;

    use super::*;
    use crate::layer::WarningKind;

    fn input(value: Value) -> RawInput {
        RawInput::new("regions.geojson", value.to_string().into_bytes())
    }

    #[test]
    fn feature_collection() {
        let layer = decode(
            &input(json!({
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "id": "north",
                        "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]},
                        "properties": {"name": "North", "pop": 12, "tags": ["a", "b"]}
                    },
                    {
                        "type": "Feature",
                        "geometry": {"type": "Point", "coordinates": [5, 5]},
                        "properties": null
                    }
                ]
            })),
            &DecodeContext::default(),
        )
        .unwrap();

        assert_eq!(layer.name(), "regions");
        assert_eq!(layer.crs(), Some(&Crs::Wgs84));
        assert!(layer.warnings().is_empty());
        let features = layer.features().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].source_id(), Some("north"));
        assert_eq!(features[0].property("pop"), Some(&PropertyValue::Number(12.0)));
        assert_eq!(
            features[0].property("tags"),
            Some(&PropertyValue::String(r#"["a","b"]"#.into()))
        );
        assert!(features[1].properties().is_empty());
    }

    #[test]
    fn invalid_features_are_skipped() {
        let layer = decode(
            &input(json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [0, 0]]]}, "properties": {}},
                    {"type": "Feature", "geometry": null, "properties": {}},
                    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}, "properties": {}}
                ]
            })),
            &DecodeContext::default(),
        )
        .unwrap();

        assert_eq!(layer.features().unwrap().len(), 1);
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::MalformedGeometry);
    }

    #[test]
    fn all_features_invalid() {
        let result = decode(
            &input(json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "geometry": {"type": "MultiPolygon", "coordinates": [[[[0, 0], [1, 1]]]]}, "properties": {}}
                ]
            })),
            &DecodeContext::default(),
        );
        assert_matches!(result, Err(IngestError::MalformedGeometry(_)));
    }

    #[test]
    fn bare_geometry_collection_is_split() {
        let layer = decode(
            &input(json!({
                "type": "GeometryCollection",
                "geometries": [
                    {"type": "Point", "coordinates": [0, 0]},
                    {"type": "Point", "coordinates": [1, 1]},
                    {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
                ]
            })),
            &DecodeContext::default(),
        )
        .unwrap();

        let types: Vec<_> = layer
            .features()
            .unwrap()
            .iter()
            .map(|f| f.geometry().geometry_type())
            .collect();
        assert_eq!(types, vec![GeometryType::MultiPoint, GeometryType::LineString]);
    }

    #[test]
    fn legacy_crs_member() {
        let layer = decode(
            &input(json!({
                "type": "Feature",
                "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
                "geometry": {"type": "Point", "coordinates": [1000000, 2000000]},
                "properties": {}
            })),
            &DecodeContext::default(),
        )
        .unwrap();
        assert_eq!(layer.crs(), Some(&Crs::WebMercator));
    }

    #[test]
    fn not_json() {
        let result = decode(
            &RawInput::new("x.geojson", b"{\"type\": ".to_vec()),
            &DecodeContext::default(),
        );
        assert_matches!(result, Err(IngestError::Io(_)));
    }
}
