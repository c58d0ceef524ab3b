use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Coarse orientation of an image-space segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// The measurement axis a ruler with this orientation calibrates.
    pub fn axis(self) -> Axis {
        match self {
            Orientation::Horizontal => Axis::X,
            Orientation::Vertical => Axis::Y,
        }
    }
}

/// Image measurement axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Coordinate of `p` along this axis.
    #[inline]
    pub fn coord(self, p: Point2<f64>) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
        }
    }

    pub fn orientation(self) -> Orientation {
        match self {
            Axis::X => Orientation::Horizontal,
            Axis::Y => Orientation::Vertical,
        }
    }
}

/// Straight image segment between two pixel positions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

impl LineSegment {
    pub fn new(start: Point2<f64>, end: Point2<f64>) -> Self {
        Self { start, end }
    }

    pub fn from_coords(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(Point2::new(x0, y0), Point2::new(x1, y1))
    }

    #[inline]
    pub fn delta(&self) -> Vector2<f64> {
        self.end - self.start
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.delta().norm()
    }

    /// Direction angle `atan2(dy, dx)` in degrees, in (-180, 180].
    pub fn angle_deg(&self) -> f64 {
        let d = self.delta();
        d.y.atan2(d.x).to_degrees()
    }

    pub fn midpoint(&self) -> Point2<f64> {
        nalgebra::center(&self.start, &self.end)
    }

    /// Unit direction from `start` to `end`; `None` for a zero-length segment.
    pub fn direction(&self) -> Option<Vector2<f64>> {
        let d = self.delta();
        let n = d.norm();
        (n > f64::EPSILON).then(|| d / n)
    }

    /// Point at parameter `t` (0 = start, 1 = end).
    pub fn point_at(&self, t: f64) -> Point2<f64> {
        self.start + self.delta() * t
    }

    /// Finite coordinates and non-zero length.
    pub fn is_well_formed(&self) -> bool {
        self.start.iter().chain(self.end.iter()).all(|v| v.is_finite())
            && self.length() > f64::EPSILON
    }

    /// Mean y of both endpoints.
    pub fn mean_y(&self) -> f64 {
        0.5 * (self.start.y + self.end.y)
    }

    /// Copy with endpoints ordered so that the coordinate along `axis` grows
    /// from `start` to `end`.
    pub fn oriented_along(&self, axis: Axis) -> Self {
        if axis.coord(self.start) <= axis.coord(self.end) {
            *self
        } else {
            Self::new(self.end, self.start)
        }
    }
}

/// Axis-aligned pixel rectangle `[x0, x1] x [y0, y1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Region {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    #[inline]
    pub fn contains(&self, p: Point2<f64>) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }

    pub fn contains_segment(&self, seg: &LineSegment) -> bool {
        self.contains(seg.start) && self.contains(seg.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn segment_derived_quantities() {
        let seg = LineSegment::from_coords(0.0, 0.0, 3.0, 4.0);
        assert_abs_diff_eq!(seg.length(), 5.0);
        assert_abs_diff_eq!(seg.midpoint().x, 1.5);
        assert_abs_diff_eq!(seg.point_at(1.0).y, 4.0);

        let vertical = LineSegment::from_coords(10.0, 50.0, 10.0, 0.0);
        assert_abs_diff_eq!(vertical.angle_deg(), -90.0);
        let flipped = vertical.oriented_along(Axis::Y);
        assert_abs_diff_eq!(flipped.start.y, 0.0);
    }

    #[test]
    fn zero_length_segment_is_not_well_formed() {
        let seg = LineSegment::from_coords(5.0, 5.0, 5.0, 5.0);
        assert!(!seg.is_well_formed());
        assert!(seg.direction().is_none());

        let nan = LineSegment::from_coords(f64::NAN, 0.0, 1.0, 1.0);
        assert!(!nan.is_well_formed());
    }

    #[test]
    fn region_normalizes_corners() {
        let r = Region::new(100.0, 80.0, 0.0, 20.0);
        assert_eq!(r.x0, 0.0);
        assert_eq!(r.y1, 80.0);
        assert!(r.contains(Point2::new(50.0, 50.0)));
        assert!(!r.contains(Point2::new(50.0, 90.0)));
    }
}
