use photogauge_core::Axis;
use photogauge_ruler::{Ruler, ScaleMode};

/// Pixel-to-millimetre conversion used for object heights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeasurementScale<'a> {
    /// Calibrated ruler. Piecewise interpolation only applies to a vertical
    /// (Y axis) ruler; an X ruler always contributes its global scale.
    Ruler { ruler: &'a Ruler, mode: ScaleMode },
    /// Single scale, e.g. from a planar reference.
    Uniform { px_per_mm: f64 },
}

impl<'a> MeasurementScale<'a> {
    pub fn global(ruler: &'a Ruler) -> Self {
        Self::Ruler {
            ruler,
            mode: ScaleMode::Global,
        }
    }

    pub fn px_per_mm(&self) -> f64 {
        match self {
            Self::Ruler { ruler, .. } => ruler.scale_px_per_mm,
            Self::Uniform { px_per_mm } => *px_per_mm,
        }
    }

    /// Millimetre height of an object whose top edge is at `top_y`, measured
    /// upward from `base_y`. Negative when the top lies below the base.
    pub fn height_mm(&self, top_y: f64, base_y: f64) -> f64 {
        let height_px = base_y - top_y;
        match *self {
            Self::Ruler {
                ruler,
                mode: ScaleMode::Piecewise,
            } if ruler.axis == Axis::Y => {
                ruler.mm_between(top_y, base_y, ScaleMode::Piecewise) * height_px.signum()
            }
            _ => height_px / self.px_per_mm(),
        }
    }

    /// True when the conversion can produce finite heights.
    pub fn is_valid(&self) -> bool {
        let s = self.px_per_mm();
        s.is_finite() && s > 0.0
    }
}
