//! Depth-aware height correction.
//!
//! A planar reference of known size gives a far-plane scale `s` (px/mm) and a
//! near/far magnification ratio. An object's magnification is interpolated
//! linearly between the far plane (x1) and the near plane (x ratio) using an
//! externally estimated depth ratio, then divided out of the raw height.
//! This is an approximation; it does not reconstruct multiple planes.

use crate::{MeasureError, PlanarCalibration};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCorrection {
    /// Reference-plane scale in pixels per millimetre.
    pub scale_px_per_mm: f64,
    /// Near-edge over far-edge pixel length, >= 1.
    pub perspective_ratio: f64,
}

impl PerspectiveCorrection {
    /// Validate inputs; a ratio below 1 is treated as swapped edges.
    pub fn new(scale_px_per_mm: f64, perspective_ratio: f64) -> Result<Self, MeasureError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(scale_px_per_mm) || !positive(perspective_ratio) {
            return Err(MeasureError::degenerate(
                "perspective reference",
                "measure the reference rectangle again",
            ));
        }
        let perspective_ratio = if perspective_ratio < 1.0 {
            perspective_ratio.recip()
        } else {
            perspective_ratio
        };
        Ok(Self {
            scale_px_per_mm,
            perspective_ratio,
        })
    }

    /// Height in millimetres before any depth correction.
    #[inline]
    pub fn raw_mm(&self, height_px: f64) -> f64 {
        height_px / self.scale_px_per_mm
    }

    /// Magnification relative to the far plane for a depth ratio in [0, 1].
    ///
    /// Out-of-range depth ratios are clamped.
    #[inline]
    pub fn magnification(&self, depth_ratio: f64) -> f64 {
        let d = if depth_ratio.is_nan() {
            0.0
        } else {
            depth_ratio.clamp(0.0, 1.0)
        };
        1.0 + d * (self.perspective_ratio - 1.0)
    }

    /// `(height_px / s) / (1 + depth_ratio * (ratio - 1))`.
    pub fn corrected_mm(&self, height_px: f64, depth_ratio: f64) -> f64 {
        self.raw_mm(height_px) / self.magnification(depth_ratio)
    }
}

impl From<&PlanarCalibration> for PerspectiveCorrection {
    fn from(cal: &PlanarCalibration) -> Self {
        Self {
            scale_px_per_mm: cal.scale_px_per_mm,
            perspective_ratio: cal.perspective_ratio.max(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn near_plane_object_is_shrunk_by_full_ratio() {
        let pc = PerspectiveCorrection::new(2.0, 1.5).expect("valid");
        assert_abs_diff_eq!(pc.raw_mm(600.0), 300.0);
        assert_abs_diff_eq!(pc.corrected_mm(600.0, 1.0), 200.0, epsilon = 1e-12);
    }

    #[test]
    fn far_plane_and_midpoint() {
        let pc = PerspectiveCorrection::new(2.0, 1.5).expect("valid");
        assert_abs_diff_eq!(pc.corrected_mm(600.0, 0.0), 300.0);
        assert_abs_diff_eq!(pc.corrected_mm(600.0, 0.5), 300.0 / 1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(pc.corrected_mm(600.0, 7.0), 200.0, epsilon = 1e-12);
    }

    #[test]
    fn swapped_ratio_and_invalid_scale() {
        let pc = PerspectiveCorrection::new(2.0, 0.5).expect("valid");
        assert_abs_diff_eq!(pc.perspective_ratio, 2.0);
        assert!(PerspectiveCorrection::new(0.0, 1.5).is_err());
        assert!(PerspectiveCorrection::new(2.0, f64::NAN).is_err());
    }
}
