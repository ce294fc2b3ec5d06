//! Ring orientation helpers.

use serde::{Deserialize, Serialize};

use crate::Point2d;

/// Direction in which the points of a closed ring go around its interior.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Winding {
    /// Clockwise
    Clockwise,
    /// Counterclockwise
    CounterClockwise,
}

/// Signed area of a ring given by its points, using the shoelace formula.
///
/// Positive for counterclockwise rings, negative for clockwise ones. The ring is treated as closed whether or not
/// the last point repeats the first one.
pub fn area_signed(points: &[Point2d]) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };

    let mut prev = first;
    let mut aggr = 0.0;
    for p in points.iter().skip(1).chain(std::iter::once(first)) {
        aggr += prev.x() * p.y() - p.x() * prev.y();
        prev = p;
    }

    aggr / 2.0
}

/// Winding of the ring. Degenerate (zero-area) rings are reported as clockwise.
pub fn winding(points: &[Point2d]) -> Winding {
    if area_signed(points) <= 0.0 {
        Winding::Clockwise
    } else {
        Winding::CounterClockwise
    }
}

/// Even-odd point in ring test.
pub fn ring_contains(points: &[Point2d], point: &Point2d) -> bool {
    let mut inside = false;
    let count = points.len();
    if count < 3 {
        return false;
    }

    let mut j = count - 1;
    for i in 0..count {
        let (pi, pj) = (&points[i], &points[j]);
        if (pi.y() > point.y()) != (pj.y() > point.y())
            && point.x() < (pj.x() - pi.x()) * (point.y() - pi.y()) / (pj.y() - pi.y()) + pi.x()
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area() {
        let cw = [
            Point2d::new(0.0, 0.0),
            Point2d::new(0.0, 1.0),
            Point2d::new(1.0, 0.0),
        ];
        assert_eq!(area_signed(&cw), -0.5);

        let ccw = [
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(0.0, 1.0),
        ];
        assert_eq!(area_signed(&ccw), 0.5);

        let closed = [
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(0.0, 1.0),
            Point2d::new(0.0, 0.0),
        ];
        assert_eq!(area_signed(&closed), 0.5);
        assert_eq!(area_signed(&[]), 0.0);
    }

    #[test]
    fn winding_of_triangles() {
        let cw = [
            Point2d::new(0.0, 0.0),
            Point2d::new(0.0, 1.0),
            Point2d::new(1.0, 0.0),
        ];
        assert_eq!(winding(&cw), Winding::Clockwise);

        let ccw = [
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(0.0, 1.0),
        ];
        assert_eq!(winding(&ccw), Winding::CounterClockwise);
    }

    #[test]
    fn contains() {
        let square = [
            Point2d::new(0.0, 0.0),
            Point2d::new(4.0, 0.0),
            Point2d::new(4.0, 4.0),
            Point2d::new(0.0, 4.0),
            Point2d::new(0.0, 0.0),
        ];
        assert!(ring_contains(&square, &Point2d::new(1.0, 1.0)));
        assert!(!ring_contains(&square, &Point2d::new(5.0, 1.0)));
        assert!(!ring_contains(&square[..2], &Point2d::new(1.0, 1.0)));
    }
}
