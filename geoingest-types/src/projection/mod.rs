//! Conversion between geographic WGS84 coordinates and the projected systems of [`Crs`](crate::Crs).

#[cfg(feature = "geodesy")]
mod geodesy;
mod identity;
mod web_mercator;

#[cfg(feature = "geodesy")]
pub use self::geodesy::GeodesyProjection;
pub use identity::IdentityProjection;
pub use web_mercator::WebMercator;

/// Projection converts geographic points into some other coordinate space and back.
pub trait Projection {
    /// Type of the input (geographic) point.
    type InPoint;
    /// Type of the projected point.
    type OutPoint;

    /// Projects a point. Returns `None` if the point cannot be represented in the target space.
    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint>;
    /// Inverse of [`Projection::project`].
    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint>;
}
