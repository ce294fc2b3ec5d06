//! Geometry model: [`Geometry`] and its building blocks [`Ring`] and [`Polygon`].

use serde::{Deserialize, Serialize};

use crate::error::GeoTypesError;
use crate::orient::{area_signed, winding, Winding};
use crate::Point2d;

/// Closed sequence of points bounding an area.
///
/// A ring always has at least 4 points and its last point equals the first one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    points: Vec<Point2d>,
}

impl Ring {
    /// Creates a new ring, appending the first point to the end if the sequence is not closed yet.
    pub fn new(mut points: Vec<Point2d>) -> Result<Self, GeoTypesError> {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            if first != last {
                points.push(*first);
            }
        }

        if points.len() < 4 {
            return Err(GeoTypesError::RingTooShort(points.len()));
        }

        Ok(Self { points })
    }

    /// Points of the ring, including the closing point.
    pub fn points(&self) -> &[Point2d] {
        &self.points
    }

    /// Signed area of the ring. See [`area_signed`].
    pub fn area_signed(&self) -> f64 {
        area_signed(&self.points)
    }

    /// Winding of the ring.
    pub fn winding(&self) -> Winding {
        winding(&self.points)
    }

    /// Reverses the ring in place if its winding differs from the given one.
    pub fn orient(&mut self, target: Winding) {
        if self.winding() != target {
            self.points.reverse();
        }
    }

    fn map_points(&self, f: &mut impl FnMut(&Point2d) -> Option<Point2d>) -> Option<Self> {
        let points = self.points.iter().map(&mut *f).collect::<Option<Vec<_>>>()?;
        Ring::new(points).ok()
    }
}

/// Polygon with one exterior ring and zero or more holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    /// Creates a new polygon.
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    /// Exterior ring.
    pub fn exterior(&self) -> &Ring {
        &self.exterior
    }

    /// Holes of the polygon.
    pub fn holes(&self) -> &[Ring] {
        &self.holes
    }

    /// Iterates over all rings, exterior first.
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Applies the GeoJSON winding convention: counterclockwise exterior, clockwise holes.
    pub fn orient(&mut self) {
        self.exterior.orient(Winding::CounterClockwise);
        for hole in &mut self.holes {
            hole.orient(Winding::Clockwise);
        }
    }

    fn map_points(&self, f: &mut impl FnMut(&Point2d) -> Option<Point2d>) -> Option<Self> {
        Some(Self {
            exterior: self.exterior.map_points(f)?,
            holes: self
                .holes
                .iter()
                .map(|hole| hole.map_points(f))
                .collect::<Option<Vec<_>>>()?,
        })
    }
}

/// Geometry of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Single point.
    Point(Point2d),
    /// Open sequence of points.
    LineString(Vec<Point2d>),
    /// Single polygon.
    Polygon(Polygon),
    /// Set of points.
    MultiPoint(Vec<Point2d>),
    /// Set of line strings.
    MultiLineString(Vec<Vec<Point2d>>),
    /// Set of polygons.
    MultiPolygon(Vec<Polygon>),
}

/// Kind of [`Geometry`], without coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeometryType {
    /// Point
    Point,
    /// LineString
    LineString,
    /// Polygon
    Polygon,
    /// MultiPoint
    MultiPoint,
    /// MultiLineString
    MultiLineString,
    /// MultiPolygon
    MultiPolygon,
}

impl Geometry {
    /// Type of the geometry.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
        }
    }

    /// Iterates over every point of the geometry.
    pub fn iter_points(&self) -> Box<dyn Iterator<Item = &Point2d> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::LineString(points) | Geometry::MultiPoint(points) => Box::new(points.iter()),
            Geometry::Polygon(polygon) => Box::new(polygon.rings().flat_map(|r| r.points().iter())),
            Geometry::MultiLineString(lines) => Box::new(lines.iter().flatten()),
            Geometry::MultiPolygon(polygons) => Box::new(
                polygons
                    .iter()
                    .flat_map(|p| p.rings().flat_map(|r| r.points().iter())),
            ),
        }
    }

    /// Creates a new geometry by converting every point with `f`.
    ///
    /// Returns `None` if `f` fails for any point, or if the converted rings collapse.
    pub fn map_points(&self, mut f: impl FnMut(&Point2d) -> Option<Point2d>) -> Option<Self> {
        let map_line = |line: &Vec<Point2d>, f: &mut dyn FnMut(&Point2d) -> Option<Point2d>| {
            line.iter().map(f).collect::<Option<Vec<_>>>()
        };

        Some(match self {
            Geometry::Point(p) => Geometry::Point(f(p)?),
            Geometry::LineString(line) => Geometry::LineString(map_line(line, &mut f)?),
            Geometry::MultiPoint(points) => Geometry::MultiPoint(map_line(points, &mut f)?),
            Geometry::MultiLineString(lines) => Geometry::MultiLineString(
                lines
                    .iter()
                    .map(|line| map_line(line, &mut f))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Geometry::Polygon(polygon) => Geometry::Polygon(polygon.map_points(&mut f)?),
            Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|p| p.map_points(&mut f))
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }

    /// Applies the GeoJSON winding convention to every polygon of the geometry.
    pub fn orient(&mut self) {
        match self {
            Geometry::Polygon(polygon) => polygon.orient(),
            Geometry::MultiPolygon(polygons) => polygons.iter_mut().for_each(Polygon::orient),
            _ => {}
        }
    }

    /// Collapses a list of geometries of the same family into a single (multi) geometry.
    ///
    /// Returns `None` if the list is empty or mixes point, line and polygon geometries.
    pub fn collapse(geometries: Vec<Geometry>) -> Option<Geometry> {
        if geometries.len() == 1 {
            return geometries.into_iter().next();
        }

        let family = geometries.first()?.geometry_type().family();
        if geometries
            .iter()
            .any(|g| g.geometry_type().family() != family)
        {
            return None;
        }

        Some(match family {
            GeometryType::Point => Geometry::MultiPoint(
                geometries
                    .into_iter()
                    .flat_map(|g| match g {
                        Geometry::Point(p) => vec![p],
                        Geometry::MultiPoint(points) => points,
                        _ => vec![],
                    })
                    .collect(),
            ),
            GeometryType::LineString => Geometry::MultiLineString(
                geometries
                    .into_iter()
                    .flat_map(|g| match g {
                        Geometry::LineString(line) => vec![line],
                        Geometry::MultiLineString(lines) => lines,
                        _ => vec![],
                    })
                    .collect(),
            ),
            _ => Geometry::MultiPolygon(
                geometries
                    .into_iter()
                    .flat_map(|g| match g {
                        Geometry::Polygon(p) => vec![p],
                        Geometry::MultiPolygon(polygons) => polygons,
                        _ => vec![],
                    })
                    .collect(),
            ),
        })
    }
}

impl GeometryType {
    /// Single-part type of the same family (`MultiPolygon` -> `Polygon` etc).
    pub fn family(&self) -> GeometryType {
        match self {
            GeometryType::Point | GeometryType::MultiPoint => GeometryType::Point,
            GeometryType::LineString | GeometryType::MultiLineString => GeometryType::LineString,
            GeometryType::Polygon | GeometryType::MultiPolygon => GeometryType::Polygon,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<Point2d> {
        vec![
            Point2d::new(x, y),
            Point2d::new(x, y + size),
            Point2d::new(x + size, y + size),
            Point2d::new(x + size, y),
        ]
    }

    #[test]
    fn ring_is_closed_on_creation() {
        let ring = Ring::new(square(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(ring.points().len(), 5);
        assert_eq!(ring.points().first(), ring.points().last());
    }

    #[test]
    fn short_ring_is_rejected() {
        let result = Ring::new(vec![Point2d::new(0.0, 0.0), Point2d::new(1.0, 1.0)]);
        assert_matches!(result, Err(GeoTypesError::RingTooShort(3)));
        assert_matches!(Ring::new(vec![]), Err(GeoTypesError::RingTooShort(0)));
    }

    #[test]
    fn polygon_orientation() {
        let exterior = Ring::new(square(0.0, 0.0, 4.0)).unwrap();
        let mut hole_points = square(1.0, 1.0, 1.0);
        hole_points.reverse();
        let hole = Ring::new(hole_points).unwrap();
        assert_eq!(exterior.winding(), Winding::Clockwise);
        assert_eq!(hole.winding(), Winding::CounterClockwise);

        let mut polygon = Polygon::new(exterior, vec![hole]);
        polygon.orient();
        assert_eq!(polygon.exterior().winding(), Winding::CounterClockwise);
        assert_eq!(polygon.holes()[0].winding(), Winding::Clockwise);

        let before = polygon.clone();
        polygon.orient();
        assert_eq!(before, polygon);
    }

    #[test]
    fn map_points_converts_all_points() {
        let geometry = Geometry::Polygon(Polygon::new(
            Ring::new(square(0.0, 0.0, 1.0)).unwrap(),
            vec![],
        ));
        let shifted = geometry
            .map_points(|p| Some(Point2d::new(p.x() + 10.0, p.y())))
            .unwrap();
        assert!(shifted.iter_points().all(|p| p.x() >= 10.0));
        assert_eq!(shifted.iter_points().count(), 5);

        assert!(geometry.map_points(|_| None).is_none());
    }

    #[test]
    fn collapse_homogeneous() {
        let collapsed = Geometry::collapse(vec![
            Geometry::Point(Point2d::new(0.0, 0.0)),
            Geometry::MultiPoint(vec![Point2d::new(1.0, 1.0), Point2d::new(2.0, 2.0)]),
        ])
        .unwrap();
        assert_matches!(collapsed, Geometry::MultiPoint(points) if points.len() == 3);

        let single = Geometry::collapse(vec![Geometry::Point(Point2d::new(0.0, 0.0))]).unwrap();
        assert_eq!(single.geometry_type(), GeometryType::Point);
    }

    #[test]
    fn collapse_heterogeneous() {
        assert!(Geometry::collapse(vec![
            Geometry::Point(Point2d::new(0.0, 0.0)),
            Geometry::LineString(vec![Point2d::new(0.0, 0.0), Point2d::new(1.0, 1.0)]),
        ])
        .is_none());
        assert!(Geometry::collapse(vec![]).is_none());
    }
}
