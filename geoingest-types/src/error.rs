//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeoTypesError {
    /// Polygon ring has less than 4 positions after closing.
    #[error("ring has {0} positions, at least 4 are required")]
    RingTooShort(usize),
    /// Position with non-finite or missing coordinates.
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
}
