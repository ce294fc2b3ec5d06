//! Geometry, feature and coordinate reference types shared by the `geoingest` crates.
//!
//! Geometries use plain `(x, y)` coordinate pairs ([`Point2d`]). Before normalization the meaning of `x` and `y` is
//! given by the [`Crs`] of the layer that owns them, after normalization `x` is longitude and `y` is latitude in
//! WGS84 degrees.

mod bounding_box;
pub use bounding_box::BoundingBox;

pub mod crs;
pub use crs::Crs;

pub mod error;
pub use error::GeoTypesError;

mod feature;
pub use feature::{Feature, Properties, PropertyValue, FILL_PROPERTY, STROKE_PROPERTY};

pub mod geometry;
pub use geometry::{Geometry, GeometryType, Polygon, Ring};

pub mod orient;

mod point;
pub use point::{GeoPoint2d, Point2d};

pub mod projection;

#[cfg(feature = "geojson")]
pub mod geojson;
