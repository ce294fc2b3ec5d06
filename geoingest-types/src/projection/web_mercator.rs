use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::projection::Projection;
use crate::{GeoPoint2d, Point2d};

const WGS84_SEMIMAJOR: f64 = 6_378_137.0;

/// Spherical Mercator projection used by web maps (EPSG:3857).
#[derive(Debug, Copy, Clone)]
pub struct WebMercator {
    semimajor: f64,
}

impl WebMercator {
    /// Creates a projection on a sphere with the given radius.
    pub fn new(semimajor: f64) -> Self {
        Self { semimajor }
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new(WGS84_SEMIMAJOR)
    }
}

impl Projection for WebMercator {
    type InPoint = GeoPoint2d;
    type OutPoint = Point2d;

    fn project(&self, input: &GeoPoint2d) -> Option<Point2d> {
        let x = self.semimajor * input.lon_rad();
        let y = self.semimajor * (FRAC_PI_4 + input.lat_rad() / 2.0).tan().ln();

        if x.is_finite() && y.is_finite() {
            Some(Point2d::new(x, y))
        } else {
            None
        }
    }

    fn unproject(&self, input: &Point2d) -> Option<GeoPoint2d> {
        let lat = 2.0 * (input.y() / self.semimajor).exp().atan() - FRAC_PI_2;
        let lon = input.x() / self.semimajor;

        if lat.is_finite() && lon.is_finite() {
            Some(GeoPoint2d::latlon(lat.to_degrees(), lon.to_degrees()))
        } else {
            None
        }
    }
}
