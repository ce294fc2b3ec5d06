use ::geodesy::prelude::*;

use crate::projection::Projection;
use crate::{GeoPoint2d, Point2d};

/// Projection backed by a `geodesy` operator definition.
pub struct GeodesyProjection {
    context: Minimal,
    op: OpHandle,
}

impl GeodesyProjection {
    /// Creates a projection from a `geodesy` operator definition, e.g. `utm zone=32`.
    pub fn new(definition: &str) -> Option<Self> {
        let mut context = Minimal::new();
        let op = context.op(definition).ok()?;
        Some(Self { context, op })
    }

    /// Universal Transverse Mercator projection for the given zone.
    pub fn utm(zone: u8, south: bool) -> Option<Self> {
        if !(1..=60).contains(&zone) {
            return None;
        }

        let definition = if south {
            format!("utm zone={zone} south")
        } else {
            format!("utm zone={zone}")
        };
        Self::new(&definition)
    }
}

impl Projection for GeodesyProjection {
    type InPoint = GeoPoint2d;
    type OutPoint = Point2d;

    fn project(&self, input: &GeoPoint2d) -> Option<Point2d> {
        let mut data = [Coor2D::geo(input.lat(), input.lon())];
        self.context.apply(self.op, Fwd, &mut data).ok()?;

        let projected = Point2d::new(data[0].0[0], data[0].0[1]);
        projected.is_finite().then_some(projected)
    }

    fn unproject(&self, input: &Point2d) -> Option<GeoPoint2d> {
        let mut data = [Coor2D([input.x(), input.y()])];
        self.context.apply(self.op, Inv, &mut data).ok()?;

        let lat = data[0].0[1].to_degrees();
        let lon = data[0].0[0].to_degrees();
        (lat.is_finite() && lon.is_finite()).then(|| GeoPoint2d::latlon(lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn utm_central_meridian_on_equator() {
        let projection = GeodesyProjection::utm(33, false).unwrap();
        let point = projection.unproject(&Point2d::new(500_000.0, 0.0)).unwrap();
        assert_abs_diff_eq!(point.lon(), 15.0, epsilon = 1e-6);
        assert_abs_diff_eq!(point.lat(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn utm_round_trip() {
        let projection = GeodesyProjection::utm(32, false).unwrap();
        let point = GeoPoint2d::latlon(55.0, 12.0);
        let projected = projection.project(&point).unwrap();
        let unprojected = projection.unproject(&projected).unwrap();
        assert_abs_diff_eq!(unprojected.lat(), point.lat(), epsilon = 1e-7);
        assert_abs_diff_eq!(unprojected.lon(), point.lon(), epsilon = 1e-7);
    }

    #[test]
    fn invalid_zone() {
        assert!(GeodesyProjection::utm(0, false).is_none());
        assert!(GeodesyProjection::utm(61, true).is_none());
    }
}
