use photogauge_core::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Minimum-area rectangle around a contour.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub center: Point2<f64>,
    /// Side length along `angle_deg`.
    pub width: f64,
    /// Side length perpendicular to `angle_deg`.
    pub height: f64,
    /// Direction of the `width` side, degrees in [0, 180).
    pub angle_deg: f64,
    /// Corners in order around the rectangle.
    pub vertices: [Point2<f64>; 4],
}

impl OrientedBox {
    /// Box spanned by orthonormal axes `u`, `v` and extents along them.
    fn from_extents(u: Vector2<f64>, v: Vector2<f64>, (u0, u1): (f64, f64), (v0, v1): (f64, f64)) -> Self {
        let corner = |a: f64, b: f64| Point2::from(u * a + v * b);
        let vertices = [corner(u0, v0), corner(u1, v0), corner(u1, v1), corner(u0, v1)];
        let center = Point2::from(u * (0.5 * (u0 + u1)) + v * (0.5 * (v0 + v1)));
        Self {
            center,
            width: u1 - u0,
            height: v1 - v0,
            angle_deg: u.y.atan2(u.x).to_degrees().rem_euclid(180.0),
            vertices,
        }
    }

    /// Axis-aligned box from a center column, a vertical span and a width.
    pub fn axis_aligned(center_x: f64, top_y: f64, bottom_y: f64, width: f64) -> Self {
        let half = 0.5 * width.max(0.0);
        let (top, bottom) = (top_y.min(bottom_y), top_y.max(bottom_y));
        Self::from_extents(
            Vector2::x(),
            Vector2::y(),
            (center_x - half, center_x + half),
            (top, bottom),
        )
    }

    /// Fit the minimum-area box around four user-placed corners.
    pub fn from_vertices(vertices: [Point2<f64>; 4]) -> Option<Self> {
        min_area_rect(&vertices)
    }

    pub fn longer_side(&self) -> f64 {
        self.width.max(self.height)
    }

    pub fn shorter_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// `longer / shorter`; infinite for a zero-width box.
    pub fn aspect_ratio(&self) -> f64 {
        let short = self.shorter_side();
        if short <= f64::EPSILON {
            f64::INFINITY
        } else {
            self.longer_side() / short
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn top_y(&self) -> f64 {
        self.vertices.iter().map(|p| p.y).fold(f64::INFINITY, f64::min)
    }

    pub fn bottom_y(&self) -> f64 {
        self.vertices.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Mean x of the four vertices.
    pub fn center_x(&self) -> f64 {
        self.vertices.iter().map(|p| p.x).sum::<f64>() / 4.0
    }
}

/// Closed contour as produced by an external extractor.
///
/// `area` and `oriented_box` may be supplied by the extractor; otherwise they
/// are derived from `points`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<Point2<f64>>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub oriented_box: Option<OrientedBox>,
}

impl Contour {
    pub fn new(points: Vec<Point2<f64>>) -> Self {
        Self {
            points,
            area: None,
            oriented_box: None,
        }
    }

    /// Enclosed area (shoelace formula) unless supplied.
    pub fn area(&self) -> f64 {
        if let Some(a) = self.area {
            return a;
        }
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let p = self.points[i];
                let q = self.points[(i + 1) % n];
                p.x * q.y - q.x * p.y
            })
            .sum();
        0.5 * twice.abs()
    }

    /// Oriented bounding box unless supplied; `None` for degenerate contours.
    pub fn oriented_box(&self) -> Option<OrientedBox> {
        self.oriented_box.or_else(|| min_area_rect(&self.points))
    }
}

fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (Andrew's monotone chain), counter-clockwise in a y-up frame.
///
/// Non-finite points are ignored; collinear points are dropped.
pub fn convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts: Vec<Point2<f64>> = points
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point2<f64>> = Vec::with_capacity(2 * pts.len());
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Minimum-area enclosing rectangle.
///
/// One side of the optimal rectangle is collinear with a hull edge, so every
/// hull edge direction is tried. `None` when the points span no area.
pub fn min_area_rect(points: &[Point2<f64>]) -> Option<OrientedBox> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<(f64, OrientedBox)> = None;
    for i in 0..hull.len() {
        let edge = hull[(i + 1) % hull.len()] - hull[i];
        let len = edge.norm();
        if len <= f64::EPSILON {
            continue;
        }
        let u = edge / len;
        let v = Vector2::new(-u.y, u.x);

        let mut u_range = (f64::INFINITY, f64::NEG_INFINITY);
        let mut v_range = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let pu = p.coords.dot(&u);
            let pv = p.coords.dot(&v);
            u_range = (u_range.0.min(pu), u_range.1.max(pu));
            v_range = (v_range.0.min(pv), v_range.1.max(pv));
        }

        let area = (u_range.1 - u_range.0) * (v_range.1 - v_range.0);
        if best.as_ref().is_none_or(|(a, _)| area < *a) {
            best = Some((area, OrientedBox::from_extents(u, v, u_range, v_range)));
        }
    }
    best.filter(|(area, _)| *area > f64::EPSILON).map(|(_, b)| b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rotated_rect(cx: f64, cy: f64, w: f64, h: f64, deg: f64) -> Vec<Point2<f64>> {
        let (s, c) = deg.to_radians().sin_cos();
        [(-w, -h), (w, -h), (w, h), (-w, h)]
            .iter()
            .map(|&(dx, dy)| {
                let (dx, dy) = (0.5 * dx, 0.5 * dy);
                Point2::new(cx + c * dx - s * dy, cy + s * dx + c * dy)
            })
            .collect()
    }

    #[test]
    fn hull_drops_interior_and_collinear_points() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
            Point2::new(4.0, 6.0),
            Point2::new(f64::NAN, 1.0),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&Point2::new(5.0, 0.0)));
        assert!(!hull.contains(&Point2::new(4.0, 6.0)));
    }

    #[test]
    fn shoelace_area_and_supplied_area() {
        let mut c = Contour::new(rotated_rect(50.0, 50.0, 20.0, 40.0, 0.0));
        assert_abs_diff_eq!(c.area(), 800.0, epsilon = 1e-9);
        c.area = Some(12.0);
        assert_eq!(c.area(), 12.0);
    }

    #[test]
    fn min_area_rect_recovers_rotated_rectangle() {
        let mut pts = rotated_rect(100.0, 200.0, 40.0, 120.0, 30.0);
        pts.push(Point2::new(100.0, 200.0));
        let b = min_area_rect(&pts).expect("box");
        assert_abs_diff_eq!(b.area(), 4800.0, epsilon = 1e-6);
        assert_abs_diff_eq!(b.longer_side(), 120.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.shorter_side(), 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.center.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.center.y, 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.aspect_ratio(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_contours_have_no_box() {
        let line = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
        ];
        assert!(min_area_rect(&line).is_none());
        assert!(Contour::new(Vec::new()).oriented_box().is_none());
    }

    #[test]
    fn axis_aligned_box_extents() {
        let b = OrientedBox::axis_aligned(50.0, 300.0, 500.0, 40.0);
        assert_abs_diff_eq!(b.top_y(), 300.0);
        assert_abs_diff_eq!(b.bottom_y(), 500.0);
        assert_abs_diff_eq!(b.center_x(), 50.0);
        assert_abs_diff_eq!(b.aspect_ratio(), 5.0);
    }
}
