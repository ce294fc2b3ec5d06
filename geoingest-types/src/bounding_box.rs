use serde::{Deserialize, Serialize};

use crate::Point2d;

/// Axis aligned rectangle in the coordinate space of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

impl BoundingBox {
    /// Creates a new bounding box.
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Bounding box of a single point.
    pub fn from_point(p: &Point2d) -> Self {
        Self::new(p.x(), p.y(), p.x(), p.y())
    }

    /// Smallest box containing all the points. Returns `None` for empty iterators.
    pub fn from_points<'a>(mut points: impl Iterator<Item = &'a Point2d>) -> Option<Self> {
        let first = points.next()?;
        let mut bbox = Self::from_point(first);
        for p in points {
            bbox.include(p);
        }

        Some(bbox)
    }

    /// Extends the box to contain `p`.
    pub fn include(&mut self, p: &Point2d) {
        self.x_min = self.x_min.min(p.x());
        self.y_min = self.y_min.min(p.y());
        self.x_max = self.x_max.max(p.x());
        self.y_max = self.y_max.max(p.y());
    }

    /// Smallest box containing both boxes.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Minimum x.
    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    /// Maximum x.
    pub fn x_max(&self) -> f64 {
        self.x_max
    }

    /// Minimum y.
    pub fn y_min(&self) -> f64 {
        self.y_min
    }

    /// Maximum y.
    pub fn y_max(&self) -> f64 {
        self.y_max
    }

    /// Width of the box.
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Height of the box.
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Returns true if the point is inside the box or on its border.
    pub fn contains(&self, point: &Point2d) -> bool {
        self.x_min <= point.x()
            && self.x_max >= point.x()
            && self.y_min <= point.y()
            && self.y_max >= point.y()
    }

    /// Returns true if the box lies within the longitude/latitude value range.
    pub fn is_geographic_range(&self) -> bool {
        self.x_min >= -180.0 && self.x_max <= 180.0 && self.y_min >= -90.0 && self.y_max <= 90.0
    }
}
