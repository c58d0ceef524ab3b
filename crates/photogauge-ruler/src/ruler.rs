use log::debug;
use photogauge_core::signal::linear_regression;
use photogauge_core::{Axis, LineSegment, MeasureError, Point2};
use serde::{Deserialize, Serialize};

/// One calibrated tick.
///
/// `pixel_offset` is measured from the ruler's zero tick along its axis, in
/// the direction of increasing value, so `pixel_offset / scale_px_per_mm`
/// recovers `real_value_mm`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub pixel_offset: f64,
    pub real_value_mm: f64,
}

/// An externally observed `(pixel, value)` pair, e.g. from a hosted service.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickObservation {
    /// Absolute pixel coordinate along the ruler axis.
    #[serde(alias = "pixel_position")]
    pub pixel: f64,
    #[serde(alias = "unit_value")]
    pub value_mm: f64,
}

/// How a ruler's scale was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulerSource {
    /// Ticks extracted from the intensity profile; scale from median spacing.
    DetectedTicks,
    /// Least-squares fit over observed `(pixel, value)` pairs.
    Regression,
    /// Two endpoints and a known or assumed real length.
    TwoPoint,
}

/// How pixel spans are converted to millimetres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Divide by the ruler's single px/mm scale.
    #[default]
    Global,
    /// Interpolate between neighbouring ticks; extrapolate with the global scale.
    Piecewise,
}

/// Calibrated ruler along one image axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ruler {
    pub line: LineSegment,
    pub axis: Axis,
    /// Absolute pixel coordinate (along `axis`) of the zero tick.
    pub zero_px: f64,
    /// `1.0` when values grow with the pixel coordinate, `-1.0` otherwise.
    pub direction: f64,
    /// Strictly increasing in `real_value_mm`; at least two entries.
    pub ticks: Vec<Tick>,
    pub scale_px_per_mm: f64,
    pub real_length_mm: f64,
    pub source: RulerSource,
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl Ruler {
    /// Ruler from tick positions extracted along `line`.
    ///
    /// `positions` are absolute coordinates along `axis`, increasing; tick `k`
    /// is assigned `k * unit_interval_mm`. The scale is
    /// `median_spacing_px / unit_interval_mm`.
    pub fn from_tick_positions(
        line: LineSegment,
        axis: Axis,
        positions: &[f64],
        median_spacing_px: f64,
        unit_interval_mm: f64,
    ) -> Result<Self, MeasureError> {
        if positions.len() < 2 {
            return Err(MeasureError::detection(
                "ruler",
                "fewer than two ticks; select the ruler endpoints manually",
            ));
        }
        if !positive(median_spacing_px) || !positive(unit_interval_mm) {
            return Err(MeasureError::degenerate(
                "tick spacing",
                "select a different ruler line",
            ));
        }
        let zero_px = positions[0];
        let scale = median_spacing_px / unit_interval_mm;
        let ticks = positions
            .iter()
            .enumerate()
            .map(|(k, &p)| Tick {
                pixel_offset: p - zero_px,
                real_value_mm: k as f64 * unit_interval_mm,
            })
            .collect();

        Ok(Self {
            line,
            axis,
            zero_px,
            direction: 1.0,
            ticks,
            scale_px_per_mm: scale,
            real_length_mm: line.length() / scale,
            source: RulerSource::DetectedTicks,
        })
    }

    /// Ruler from observed `(pixel, value)` pairs.
    ///
    /// Non-finite pairs are dropped and duplicate values keep their first
    /// observation. With at least `regression_min_pairs` pairs the scale and
    /// zero reference come from a least-squares fit; otherwise the first and
    /// last pair define them.
    pub fn from_observations(
        line: Option<LineSegment>,
        axis: Axis,
        observations: &[TickObservation],
        regression_min_pairs: usize,
    ) -> Result<Self, MeasureError> {
        let mut obs: Vec<TickObservation> = observations
            .iter()
            .copied()
            .filter(|o| o.pixel.is_finite() && o.value_mm.is_finite())
            .collect();
        obs.sort_by(|a, b| a.value_mm.total_cmp(&b.value_mm));
        obs.dedup_by(|b, a| a.value_mm == b.value_mm);

        if obs.len() < 2 {
            return Err(MeasureError::detection(
                "tick list",
                "need at least two ticks with distinct values; mark the ruler endpoints manually",
            ));
        }

        let values: Vec<f64> = obs.iter().map(|o| o.value_mm).collect();
        let pixels: Vec<f64> = obs.iter().map(|o| o.pixel).collect();

        let (slope, intercept, source) = if obs.len() >= regression_min_pairs.max(2) {
            let fit = linear_regression(&values, &pixels).ok_or_else(|| {
                MeasureError::degenerate("tick regression", "provide ticks with distinct values")
            })?;
            debug!(
                "tick regression over {} pairs: slope {:.5} px/mm, r2 {:.4}",
                obs.len(),
                fit.slope,
                fit.r_squared
            );
            (fit.slope, fit.intercept, RulerSource::Regression)
        } else {
            let (first, last) = (obs[0], obs[obs.len() - 1]);
            let slope = (last.pixel - first.pixel) / (last.value_mm - first.value_mm);
            (slope, first.pixel - slope * first.value_mm, RulerSource::TwoPoint)
        };

        let scale = slope.abs();
        if !positive(scale) || scale < 1e-9 {
            return Err(MeasureError::degenerate(
                "tick positions",
                "ticks share one pixel position; select a different ruler",
            ));
        }
        let direction = slope.signum();
        let zero_px = intercept;

        let ticks = obs
            .iter()
            .map(|o| Tick {
                pixel_offset: (o.pixel - zero_px) * direction,
                real_value_mm: o.value_mm,
            })
            .collect();

        let line = line.unwrap_or_else(|| synthetic_line(axis, pixels[0], pixels[pixels.len() - 1]));
        let real_length_mm = values[values.len() - 1] - values[0];

        Ok(Self {
            line,
            axis,
            zero_px,
            direction,
            ticks,
            scale_px_per_mm: scale,
            real_length_mm,
            source,
        })
    }

    /// Two-point ruler spanning `line` with a known (or assumed) real length.
    pub fn two_point(line: LineSegment, axis: Axis, real_length_mm: f64) -> Result<Self, MeasureError> {
        let length_px = line.length();
        if !line.is_well_formed() || !positive(real_length_mm) {
            return Err(MeasureError::degenerate(
                "ruler endpoints",
                "drag the ruler endpoints apart and enter a positive length",
            ));
        }
        let line = line.oriented_along(axis);
        Ok(Self {
            line,
            axis,
            zero_px: axis.coord(line.start),
            direction: 1.0,
            ticks: vec![
                Tick {
                    pixel_offset: 0.0,
                    real_value_mm: 0.0,
                },
                Tick {
                    pixel_offset: length_px,
                    real_value_mm: real_length_mm,
                },
            ],
            scale_px_per_mm: length_px / real_length_mm,
            real_length_mm,
            source: RulerSource::TwoPoint,
        })
    }

    /// True for rulers built without tick evidence.
    pub fn is_fallback(&self) -> bool {
        self.source == RulerSource::TwoPoint
    }

    /// Real value (mm) at an absolute pixel coordinate along the axis.
    pub fn value_at(&self, pixel: f64, mode: ScaleMode) -> f64 {
        let offset = (pixel - self.zero_px) * self.direction;
        match mode {
            ScaleMode::Global => offset / self.scale_px_per_mm,
            ScaleMode::Piecewise => self.piecewise_value(offset),
        }
    }

    /// Absolute pixel coordinate of a real value, using the global scale.
    pub fn pixel_of(&self, value_mm: f64) -> f64 {
        self.zero_px + self.direction * value_mm * self.scale_px_per_mm
    }

    /// Millimetre length of the pixel span `[a_px, b_px]` along the axis.
    pub fn mm_between(&self, a_px: f64, b_px: f64, mode: ScaleMode) -> f64 {
        match mode {
            ScaleMode::Global => (b_px - a_px).abs() / self.scale_px_per_mm,
            ScaleMode::Piecewise => (self.value_at(b_px, mode) - self.value_at(a_px, mode)).abs(),
        }
    }

    fn piecewise_value(&self, offset: f64) -> f64 {
        let ticks = &self.ticks;
        if ticks.len() < 2 {
            return offset / self.scale_px_per_mm;
        }
        let first = ticks[0];
        let last = ticks[ticks.len() - 1];
        if offset <= first.pixel_offset {
            return first.real_value_mm + (offset - first.pixel_offset) / self.scale_px_per_mm;
        }
        if offset >= last.pixel_offset {
            return last.real_value_mm + (offset - last.pixel_offset) / self.scale_px_per_mm;
        }
        // Ticks are ordered by value; offsets follow for any sane ruler.
        let k = ticks
            .windows(2)
            .position(|w| offset >= w[0].pixel_offset && offset <= w[1].pixel_offset);
        match k {
            Some(k) => {
                let (a, b) = (ticks[k], ticks[k + 1]);
                let span = b.pixel_offset - a.pixel_offset;
                if span.abs() < f64::EPSILON {
                    return a.real_value_mm;
                }
                let t = (offset - a.pixel_offset) / span;
                a.real_value_mm + t * (b.real_value_mm - a.real_value_mm)
            }
            None => offset / self.scale_px_per_mm,
        }
    }
}

fn synthetic_line(axis: Axis, a: f64, b: f64) -> LineSegment {
    let (lo, hi) = (a.min(b), a.max(b));
    match axis {
        Axis::X => LineSegment::new(Point2::new(lo, 0.0), Point2::new(hi, 0.0)),
        Axis::Y => LineSegment::new(Point2::new(0.0, lo), Point2::new(0.0, hi)),
    }
}
