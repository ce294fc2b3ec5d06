//! Conversion between the crate geometry model and the [`geojson`] crate types.

use geojson::{JsonObject, JsonValue, Position, Value};

use crate::error::GeoTypesError;
use crate::geometry::{Geometry, GeometryType, Polygon, Ring};
use crate::{Feature, Point2d, Properties, PropertyValue};

/// Converts a GeoJSON geometry.
///
/// Geometry collections that mix point, line and polygon members cannot be represented by a single [`Geometry`], so
/// they are split into one geometry per family. Every other input produces exactly one geometry.
pub fn geometries_from_geojson(geometry: &geojson::Geometry) -> Result<Vec<Geometry>, GeoTypesError> {
    let Value::GeometryCollection(members) = &geometry.value else {
        return Ok(vec![convert_value(&geometry.value)?]);
    };

    let mut flat = vec![];
    for member in members {
        flat.extend(geometries_from_geojson(member)?);
    }

    if flat.is_empty() {
        return Err(GeoTypesError::Conversion("empty geometry collection".into()));
    }

    Ok(collapse_by_family(flat))
}

/// Groups geometries by family (points, lines, polygons) and collapses every group into one geometry.
pub fn collapse_by_family(geometries: Vec<Geometry>) -> Vec<Geometry> {
    let mut families: Vec<(GeometryType, Vec<Geometry>)> = vec![];
    for geometry in geometries {
        let family = geometry.geometry_type().family();
        match families.iter_mut().find(|(f, _)| *f == family) {
            Some((_, group)) => group.push(geometry),
            None => families.push((family, vec![geometry])),
        }
    }

    families
        .into_iter()
        .filter_map(|(_, group)| Geometry::collapse(group))
        .collect()
}

fn convert_value(value: &Value) -> Result<Geometry, GeoTypesError> {
    Ok(match value {
        Value::Point(p) => Geometry::Point(convert_position(p)?),
        Value::MultiPoint(points) => {
            non_empty(points, "multipoint")?;
            Geometry::MultiPoint(convert_positions(points)?)
        }
        Value::LineString(line) => Geometry::LineString(convert_line(line)?),
        Value::MultiLineString(lines) => {
            non_empty(lines, "multilinestring")?;
            Geometry::MultiLineString(lines.iter().map(|l| convert_line(l)).collect::<Result<_, _>>()?)
        }
        Value::Polygon(rings) => Geometry::Polygon(convert_polygon(rings)?),
        Value::MultiPolygon(polygons) => {
            non_empty(polygons, "multipolygon")?;
            Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|p| convert_polygon(p))
                    .collect::<Result<_, _>>()?,
            )
        }
        Value::GeometryCollection(_) => {
            return Err(GeoTypesError::Conversion(
                "nested geometry collection must be flattened first".into(),
            ))
        }
    })
}

fn non_empty<T>(items: &[T], name: &str) -> Result<(), GeoTypesError> {
    if items.is_empty() {
        Err(GeoTypesError::Conversion(format!("empty {name}")))
    } else {
        Ok(())
    }
}

fn convert_position(position: &Position) -> Result<Point2d, GeoTypesError> {
    if position.len() < 2 {
        return Err(GeoTypesError::InvalidPosition(format!(
            "position has {} values",
            position.len()
        )));
    }

    // Altitude and any further values are dropped.
    let point = Point2d::new(position[0], position[1]);
    if !point.is_finite() {
        return Err(GeoTypesError::InvalidPosition(format!("{position:?}")));
    }

    Ok(point)
}

fn convert_positions(positions: &[Position]) -> Result<Vec<Point2d>, GeoTypesError> {
    positions.iter().map(convert_position).collect()
}

fn convert_line(line: &[Position]) -> Result<Vec<Point2d>, GeoTypesError> {
    if line.len() < 2 {
        return Err(GeoTypesError::Conversion(format!(
            "line string has {} positions, at least 2 are required",
            line.len()
        )));
    }

    convert_positions(line)
}

fn convert_ring(ring: &[Position]) -> Result<Ring, GeoTypesError> {
    if ring.len() < 4 {
        return Err(GeoTypesError::RingTooShort(ring.len()));
    }

    Ring::new(convert_positions(ring)?)
}

fn convert_polygon(rings: &[Vec<Position>]) -> Result<Polygon, GeoTypesError> {
    let Some((exterior, holes)) = rings.split_first() else {
        return Err(GeoTypesError::Conversion("polygon without rings".into()));
    };

    Ok(Polygon::new(
        convert_ring(exterior)?,
        holes.iter().map(|h| convert_ring(h)).collect::<Result<_, _>>()?,
    ))
}

/// Converts a JSON value into a flat property value. Arrays and objects are kept as their JSON text.
pub fn property_from_json(value: &JsonValue) -> PropertyValue {
    match value {
        JsonValue::Null => PropertyValue::Null,
        JsonValue::Bool(v) => PropertyValue::Bool(*v),
        JsonValue::Number(n) => n
            .as_f64()
            .map(PropertyValue::Number)
            .unwrap_or_else(|| PropertyValue::String(n.to_string())),
        JsonValue::String(s) => PropertyValue::String(s.clone()),
        nested => PropertyValue::String(nested.to_string()),
    }
}

/// Converts a GeoJSON properties object.
pub fn properties_from_json(object: Option<&JsonObject>) -> Properties {
    object
        .map(|o| {
            o.iter()
                .map(|(key, value)| (key.clone(), property_from_json(value)))
                .collect()
        })
        .unwrap_or_default()
}

/// Converts a property value into JSON.
pub fn property_to_json(value: &PropertyValue) -> JsonValue {
    match value {
        PropertyValue::String(v) => JsonValue::String(v.clone()),
        PropertyValue::Number(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        PropertyValue::Bool(v) => JsonValue::Bool(*v),
        PropertyValue::Null => JsonValue::Null,
    }
}

fn position(p: &Point2d) -> Position {
    vec![p.x(), p.y()]
}

fn ring_positions(ring: &Ring) -> Vec<Position> {
    ring.points().iter().map(position).collect()
}

fn polygon_positions(polygon: &Polygon) -> Vec<Vec<Position>> {
    polygon.rings().map(ring_positions).collect()
}

/// Converts a geometry into GeoJSON.
pub fn geometry_to_geojson(geometry: &Geometry) -> geojson::Geometry {
    let value = match geometry {
        Geometry::Point(p) => Value::Point(position(p)),
        Geometry::LineString(line) => Value::LineString(line.iter().map(position).collect()),
        Geometry::Polygon(polygon) => Value::Polygon(polygon_positions(polygon)),
        Geometry::MultiPoint(points) => Value::MultiPoint(points.iter().map(position).collect()),
        Geometry::MultiLineString(lines) => Value::MultiLineString(
            lines
                .iter()
                .map(|l| l.iter().map(position).collect())
                .collect(),
        ),
        Geometry::MultiPolygon(polygons) => {
            Value::MultiPolygon(polygons.iter().map(polygon_positions).collect())
        }
    };

    geojson::Geometry::new(value)
}

/// Converts a feature into GeoJSON.
pub fn feature_to_geojson(feature: &Feature) -> geojson::Feature {
    let properties: JsonObject = feature
        .properties()
        .iter()
        .map(|(key, value)| (key.clone(), property_to_json(value)))
        .collect();

    geojson::Feature {
        bbox: None,
        geometry: Some(geometry_to_geojson(feature.geometry())),
        id: feature
            .source_id()
            .map(|id| geojson::feature::Id::String(id.to_owned())),
        properties: Some(properties),
        foreign_members: None,
    }
}
