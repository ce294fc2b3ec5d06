use crate::projection::Projection;
use crate::{GeoPoint2d, Point2d};

/// Maps geographic coordinates onto `(lon, lat)` points without changing their values.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityProjection;

impl Projection for IdentityProjection {
    type InPoint = GeoPoint2d;
    type OutPoint = Point2d;

    fn project(&self, input: &GeoPoint2d) -> Option<Point2d> {
        Some(input.to_lonlat())
    }

    fn unproject(&self, input: &Point2d) -> Option<GeoPoint2d> {
        Some(GeoPoint2d::latlon(input.y(), input.x()))
    }
}
