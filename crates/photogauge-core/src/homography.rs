use crate::MeasureError;
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

const PIVOT_EPS: f64 = 1e-12;
const DET_EPS: f64 = 1e-12;
/// Relative tolerance for the three-corner collinearity test.
const COLLINEAR_REL_EPS: f64 = 1e-9;

/// Projective transform `dst ~ H * src`, normalized so that `h[(2, 2)] = 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Forward mapping `(h0 x + h1 y + h2) / (h6 x + h7 y + h8)`.
    ///
    /// `None` when the point maps to the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < PIVOT_EPS {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    pub fn determinant(&self) -> f64 {
        self.h.determinant()
    }

    /// Inverse via the adjugate; `None` when the determinant is ~0.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < DET_EPS {
            return None;
        }
        let inv = adjugate(&self.h) / det;
        Some(Self::new(normalize_homography(inv).unwrap_or(inv)))
    }

    /// Map `p` through the inverse transform.
    pub fn apply_inverse(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        self.inverse()?.apply(p)
    }
}

fn adjugate(m: &Matrix3<f64>) -> Matrix3<f64> {
    let c = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m[(r0, c0)] * m[(r1, c1)] - m[(r0, c1)] * m[(r1, c0)]
    };
    // Transposed cofactor matrix.
    Matrix3::new(
        c(1, 2, 1, 2),
        -c(0, 2, 1, 2),
        c(0, 1, 1, 2),
        -c(1, 2, 0, 2),
        c(0, 2, 0, 2),
        -c(0, 1, 0, 2),
        c(1, 2, 0, 1),
        -c(0, 2, 0, 1),
        c(0, 1, 0, 1),
    )
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points4(pts: &[Point2<f64>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    // Translate to centroid, scale so mean distance = sqrt(2).
    let centroid = pts.iter().fold(Vector3::<f64>::zeros(), |acc, p| {
        acc + Vector3::new(p.x, p.y, 0.0)
    }) / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - centroid.x).powi(2) + (p.y - centroid.y).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;

    let t = hartley_normalization(centroid.x, centroid.y, mean_dist);
    let out = pts.map(|p| {
        let v = t * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0], v[1])
    });
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < PIVOT_EPS {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Gaussian elimination with partial pivoting.
///
/// Fails when any pivot magnitude drops below `PIVOT_EPS`.
fn solve_partial_pivot(
    mut a: SMatrix<f64, 8, 8>,
    mut b: SVector<f64, 8>,
) -> Option<SVector<f64, 8>> {
    const N: usize = 8;
    for col in 0..N {
        let (pivot_row, pivot_abs) = (col..N)
            .map(|r| (r, a[(r, col)].abs()))
            .max_by(|x, y| x.1.total_cmp(&y.1))?;
        if !pivot_abs.is_finite() || pivot_abs < PIVOT_EPS {
            return None;
        }
        if pivot_row != col {
            a.swap_rows(pivot_row, col);
            b.swap_rows(pivot_row, col);
        }
        for r in col + 1..N {
            let factor = a[(r, col)] / a[(col, col)];
            if factor == 0.0 {
                continue;
            }
            for c in col..N {
                a[(r, c)] -= factor * a[(col, c)];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = SVector::<f64, 8>::zeros();
    for r in (0..N).rev() {
        let tail: f64 = (r + 1..N).map(|c| a[(r, c)] * x[c]).sum();
        x[r] = (b[r] - tail) / a[(r, r)];
    }
    Some(x)
}

/// True when any three of the four points are (nearly) collinear.
fn has_collinear_triple(pts: &[Point2<f64>; 4]) -> bool {
    let extent = pts
        .iter()
        .flat_map(|p| pts.iter().map(move |q| (p - q).norm()))
        .fold(0.0_f64, f64::max);
    if extent <= f64::EPSILON {
        return true;
    }
    let tol = COLLINEAR_REL_EPS * extent * extent;
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        let u = pts[j] - pts[i];
        let v = pts[k] - pts[i];
        (u.x * v.y - u.y * v.x).abs() <= tol
    })
}

/// Compute H such that `dst ~ H * src` from 4 point correspondences.
///
/// Builds the 8x8 system for `h0..h7` (with `h8 = 1`) on Hartley-normalized
/// points. Returns `None` for non-finite input, three collinear corners on
/// either side, or a vanishing pivot.
///
/// Corner order must be consistent between `src` and `dst`; see [`order_quad`].
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let finite = src
        .iter()
        .chain(dst.iter())
        .all(|p| p.x.is_finite() && p.y.is_finite());
    if !finite || has_collinear_triple(src) || has_collinear_triple(dst) {
        return None;
    }

    let (src_n, t_src) = normalize_points4(src);
    let (dst_n, t_dst) = normalize_points4(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = solve_partial_pivot(a, b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// Order four corners as (TL, TR, BR, BL).
///
/// Sorts by y into a top and a bottom pair, then by x within each pair.
pub fn order_quad(corners: [Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let mut by_y = corners;
    by_y.sort_by(|a, b| a.y.total_cmp(&b.y));
    let (mut top, mut bottom) = ([by_y[0], by_y[1]], [by_y[2], by_y[3]]);
    top.sort_by(|a, b| a.x.total_cmp(&b.x));
    bottom.sort_by(|a, b| a.x.total_cmp(&b.x));
    [top[0], top[1], bottom[1], bottom[0]]
}

/// A planar rectangle of known size observed as an image quadrilateral.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarReference {
    /// Image corners in any order; normalized to (TL, TR, BR, BL) on use.
    pub corners: [Point2<f64>; 4],
    pub width_mm: f64,
    pub height_mm: f64,
    /// Externally measured near-edge length in pixels (overrides the quad).
    #[serde(default)]
    pub near_edge_px: Option<f64>,
    /// Externally measured far-edge length in pixels (overrides the quad).
    #[serde(default)]
    pub far_edge_px: Option<f64>,
}

/// Resolved planar reference: rectifying homography plus scale figures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarCalibration {
    /// Ordered image corners (TL, TR, BR, BL).
    pub corners: [Point2<f64>; 4],
    /// Maps image pixels to plane millimetres.
    pub img_to_plane: Homography,
    /// Maps plane millimetres back to image pixels.
    pub plane_to_img: Homography,
    /// Pixels per millimetre on the far (reference) edge.
    pub scale_px_per_mm: f64,
    /// Near-edge over far-edge length, always >= 1.
    pub perspective_ratio: f64,
}

impl PlanarReference {
    pub fn new(corners: [Point2<f64>; 4], width_mm: f64, height_mm: f64) -> Self {
        Self {
            corners,
            width_mm,
            height_mm,
            near_edge_px: None,
            far_edge_px: None,
        }
    }

    /// Build the rectifying homography and derive scale and perspective ratio.
    pub fn resolve(&self) -> Result<PlanarCalibration, MeasureError> {
        const HINT: &str = "select four corners of the reference rectangle again";
        let size_ok = |v: f64| v.is_finite() && v > 0.0;
        if !size_ok(self.width_mm) || !size_ok(self.height_mm) {
            return Err(MeasureError::degenerate(
                "planar reference size",
                "enter a positive reference width and height",
            ));
        }

        let corners = order_quad(self.corners);
        let [tl, tr, br, bl] = corners;
        let plane = [
            Point2::new(0.0, 0.0),
            Point2::new(self.width_mm, 0.0),
            Point2::new(self.width_mm, self.height_mm),
            Point2::new(0.0, self.height_mm),
        ];

        let img_to_plane = homography_from_4pt(&corners, &plane)
            .ok_or_else(|| MeasureError::degenerate("reference quadrilateral", HINT))?;
        let plane_to_img = img_to_plane
            .inverse()
            .ok_or_else(|| MeasureError::degenerate("reference homography", HINT))?;

        let (near, far) = match (self.near_edge_px, self.far_edge_px) {
            (Some(near), Some(far)) => (near, far),
            _ => ((br - bl).norm(), (tr - tl).norm()),
        };
        if !size_ok(near) || !size_ok(far) {
            return Err(MeasureError::degenerate("reference edge lengths", HINT));
        }
        // The far edge always projects shorter; a ratio < 1 means swapped edges.
        let (near, far) = if near >= far { (near, far) } else { (far, near) };

        Ok(PlanarCalibration {
            corners,
            img_to_plane,
            plane_to_img,
            scale_px_per_mm: far / self.width_mm,
            perspective_ratio: near / far,
        })
    }
}

impl PlanarCalibration {
    /// Image pixel to plane millimetres.
    pub fn to_plane(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        self.img_to_plane.apply(p)
    }

    /// Plane millimetres to image pixel.
    pub fn to_image(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        self.plane_to_img.apply(p)
    }

    /// Metric distance between two image points lying on the reference plane.
    pub fn distance_mm(&self, a: Point2<f64>, b: Point2<f64>) -> Option<f64> {
        Some((self.to_plane(b)? - self.to_plane(a)?).norm())
    }
}
