use bytes::Buf;
use geoingest_types::geometry::{Geometry, Polygon, Ring};
use geoingest_types::orient::{ring_contains, Winding};
use geoingest_types::Point2d;

use crate::error::ShpError;
use crate::header::{ensure, ShapeType};

/// Planar content of a single record. Z and M values are not kept.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Record without geometry.
    Null,
    /// Single point.
    Point(Point2d),
    /// Set of points.
    MultiPoint(Vec<Point2d>),
    /// Parts of a line.
    PolyLine(Vec<Vec<Point2d>>),
    /// Rings, exteriors clockwise.
    Polygon(Vec<Vec<Point2d>>),
}

impl Shape {
    pub(crate) fn decode(content: &[u8], index: usize) -> Result<Self, ShpError> {
        let mut buf = content;
        ensure(&buf, 4, "record shape type")?;
        let code = buf.get_i32_le();
        let shape_type = ShapeType::from_code(code).ok_or(ShpError::UnsupportedShapeType(code))?;

        match shape_type.planar() {
            ShapeType::Null => Ok(Shape::Null),
            ShapeType::Point => Ok(Shape::Point(read_point(&mut buf)?)),
            ShapeType::MultiPoint => {
                ensure(&buf, 36, "multipoint header")?;
                buf.advance(32);
                let count = read_count(&mut buf, index, "points")?;
                Ok(Shape::MultiPoint(read_points(&mut buf, count)?))
            }
            ShapeType::PolyLine => Ok(Shape::PolyLine(read_parts(&mut buf, index)?)),
            ShapeType::Polygon => Ok(Shape::Polygon(read_parts(&mut buf, index)?)),
            _ => Err(ShpError::UnsupportedShapeType(code)),
        }
    }

    /// Converts the record into a geometry. Null shapes produce `None`.
    ///
    /// Polygon rings are assembled with the shapefile convention: clockwise rings are exteriors, counterclockwise
    /// rings are holes of the smallest exterior that contains them.
    pub fn into_geometry(self, index: usize) -> Result<Option<Geometry>, ShpError> {
        let invalid = |message: String| ShpError::InvalidRecord { index, message };

        Ok(Some(match self {
            Shape::Null => return Ok(None),
            Shape::Point(p) => Geometry::Point(p),
            Shape::MultiPoint(points) if points.is_empty() => {
                return Err(invalid("multipoint without points".into()))
            }
            Shape::MultiPoint(points) => Geometry::MultiPoint(points),
            Shape::PolyLine(parts) => {
                let mut lines: Vec<_> = parts.into_iter().filter(|p| p.len() >= 2).collect();
                match lines.len() {
                    0 => return Err(invalid("polyline without valid parts".into())),
                    1 => Geometry::LineString(lines.remove(0)),
                    _ => Geometry::MultiLineString(lines),
                }
            }
            Shape::Polygon(parts) => {
                let mut polygons = assemble_polygons(parts);
                match polygons.len() {
                    0 => return Err(invalid("polygon without valid rings".into())),
                    1 => Geometry::Polygon(polygons.remove(0)),
                    _ => Geometry::MultiPolygon(polygons),
                }
            }
        }))
    }
}

fn read_point(buf: &mut &[u8]) -> Result<Point2d, ShpError> {
    ensure(&*buf, 16, "point")?;
    Ok(Point2d::new(buf.get_f64_le(), buf.get_f64_le()))
}

fn read_points(buf: &mut &[u8], count: usize) -> Result<Vec<Point2d>, ShpError> {
    ensure(&*buf, count * 16, "point array")?;
    Ok((0..count)
        .map(|_| Point2d::new(buf.get_f64_le(), buf.get_f64_le()))
        .collect())
}

fn read_count(buf: &mut &[u8], index: usize, what: &str) -> Result<usize, ShpError> {
    let value = buf.get_i32_le();
    usize::try_from(value).map_err(|_| ShpError::InvalidRecord {
        index,
        message: format!("negative number of {what}: {value}"),
    })
}

fn read_parts(buf: &mut &[u8], index: usize) -> Result<Vec<Vec<Point2d>>, ShpError> {
    ensure(&*buf, 40, "multipart header")?;
    buf.advance(32);
    let num_parts = read_count(buf, index, "parts")?;
    let num_points = read_count(buf, index, "points")?;

    ensure(&*buf, num_parts * 4, "part index")?;
    let starts: Vec<usize> = (0..num_parts)
        .map(|_| buf.get_i32_le().max(0) as usize)
        .collect();

    let valid_starts = starts.first() == Some(&0) || starts.is_empty();
    if !valid_starts
        || starts.windows(2).any(|w| w[0] > w[1])
        || starts.iter().any(|s| *s > num_points)
    {
        return Err(ShpError::InvalidRecord {
            index,
            message: format!("invalid part offsets {starts:?} for {num_points} points"),
        });
    }

    let points = read_points(buf, num_points)?;
    Ok(starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end = starts.get(i + 1).copied().unwrap_or(num_points);
            points[*start..end].to_vec()
        })
        .collect())
}

fn assemble_polygons(parts: Vec<Vec<Point2d>>) -> Vec<Polygon> {
    let rings: Vec<Ring> = parts
        .into_iter()
        .filter_map(|points| match Ring::new(points) {
            Ok(ring) => Some(ring),
            Err(err) => {
                log::debug!("Skipping polygon ring: {err}");
                None
            }
        })
        .collect();

    let has_exterior = rings.iter().any(|r| r.winding() == Winding::Clockwise);
    let (exteriors, holes): (Vec<Ring>, Vec<Ring>) = rings
        .into_iter()
        .partition(|r| !has_exterior || r.winding() == Winding::Clockwise);

    let mut polygons: Vec<(Ring, Vec<Ring>)> = exteriors.into_iter().map(|r| (r, vec![])).collect();
    for hole in holes {
        let sample = hole.points()[0];
        let container = polygons
            .iter_mut()
            .filter(|(exterior, _)| ring_contains(exterior.points(), &sample))
            .min_by(|(a, _), (b, _)| {
                a.area_signed()
                    .abs()
                    .total_cmp(&b.area_signed().abs())
            });

        match container {
            Some((_, container_holes)) => container_holes.push(hole),
            // A hole outside every exterior is most likely an exterior with wrong winding.
            None => polygons.push((hole, vec![])),
        }
    }

    polygons
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect()
}
