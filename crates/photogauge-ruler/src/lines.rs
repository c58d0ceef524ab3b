use crate::ticks::{calibrate_segment, TickParams};
use crate::Ruler;
use log::{debug, warn};
use photogauge_core::{LineSegment, MeasureError, Orientation, ProfileSampler, Region};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters for segment classification and ruler / base-line selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineClassifierParams {
    /// Max deviation from horizontal/vertical (degrees).
    pub angle_tolerance_deg: f64,
    /// Number of longest candidates tried for tick calibration.
    pub max_candidates: usize,
    /// Ticks a candidate must yield to be accepted as a ruler.
    pub min_ruler_ticks: usize,
    /// Assumed real length of the fallback two-point ruler (mm).
    pub fallback_length_mm: f64,
    /// Absolute minimal base-line length (pixels).
    pub min_base_line_length_px: f64,
    /// Minimal base-line length as a fraction of the search region width.
    pub min_base_line_width_fraction: f64,
    pub ticks: TickParams,
}

impl Default for LineClassifierParams {
    fn default() -> Self {
        Self {
            angle_tolerance_deg: 20.0,
            max_candidates: 10,
            min_ruler_ticks: 5,
            fallback_length_mm: 400.0,
            min_base_line_length_px: 50.0,
            min_base_line_width_fraction: 0.3,
            ticks: TickParams::default(),
        }
    }
}

/// Reference row from which object heights are measured upward.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseLine {
    pub pixel_y: f64,
    /// Real-world value at the base line; `0.0` for a floor or table top.
    #[serde(default)]
    pub real_value_mm: f64,
}

impl BaseLine {
    pub fn new(pixel_y: f64) -> Self {
        Self {
            pixel_y,
            real_value_mm: 0.0,
        }
    }
}

/// Rulers found per image axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedRulers {
    /// Horizontal ruler calibrating the x axis.
    pub x: Option<Ruler>,
    /// Vertical ruler calibrating the y axis.
    pub y: Option<Ruler>,
}

/// Classify a segment by `atan2(dy, dx)`.
///
/// Horizontal within `tolerance_deg` of 0° or 180°, vertical within
/// `tolerance_deg` of ±90°, otherwise `None`. Malformed segments are `None`.
pub fn classify_segment(seg: &LineSegment, tolerance_deg: f64) -> Option<Orientation> {
    if !seg.is_well_formed() {
        return None;
    }
    let theta = seg.angle_deg().abs();
    if theta < tolerance_deg || theta > 180.0 - tolerance_deg {
        Some(Orientation::Horizontal)
    } else if (theta - 90.0).abs() < tolerance_deg {
        Some(Orientation::Vertical)
    } else {
        None
    }
}

/// Segments of the given orientation, longest first.
pub fn rank_candidates(
    lines: &[LineSegment],
    orientation: Orientation,
    tolerance_deg: f64,
) -> Vec<LineSegment> {
    let mut out: Vec<LineSegment> = lines
        .iter()
        .filter(|l| classify_segment(l, tolerance_deg) == Some(orientation))
        .copied()
        .collect();
    out.sort_by(|a, b| b.length().total_cmp(&a.length()));
    out
}

/// Pick the ruler of one orientation.
///
/// The longest `max_candidates` segments are tick-calibrated in order and the
/// first with at least `min_ruler_ticks` ticks wins. Without such a candidate
/// the longest segment becomes a two-point ruler of `fallback_length_mm`.
pub fn detect_ruler(
    lines: &[LineSegment],
    orientation: Orientation,
    sampler: &(impl ProfileSampler + ?Sized),
    params: &LineClassifierParams,
) -> Result<Ruler, MeasureError> {
    let candidates = rank_candidates(lines, orientation, params.angle_tolerance_deg);
    let Some(longest) = candidates.first().copied() else {
        return Err(MeasureError::detection(
            "ruler",
            format!("no {orientation:?} line found; mark the ruler endpoints manually"),
        ));
    };

    for (rank, seg) in candidates.iter().take(params.max_candidates).enumerate() {
        match calibrate_segment(seg, orientation, sampler, &params.ticks) {
            Ok(ruler) if ruler.ticks.len() >= params.min_ruler_ticks => {
                debug!(
                    "{orientation:?} ruler: candidate #{rank} with {} ticks, {:.4} px/mm",
                    ruler.ticks.len(),
                    ruler.scale_px_per_mm
                );
                return Ok(ruler);
            }
            Ok(ruler) => debug!(
                "{orientation:?} candidate #{rank}: only {} ticks",
                ruler.ticks.len()
            ),
            Err(err) => debug!("{orientation:?} candidate #{rank}: {err}"),
        }
    }

    warn!(
        "no {orientation:?} candidate with {} ticks; assuming {} mm over the longest line",
        params.min_ruler_ticks, params.fallback_length_mm
    );
    Ruler::two_point(longest, orientation.axis(), params.fallback_length_mm)
}

/// Detect the horizontal (x) and vertical (y) rulers.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(lines = lines.len()))
)]
pub fn detect_rulers(
    lines: &[LineSegment],
    sampler: &(impl ProfileSampler + ?Sized),
    params: &LineClassifierParams,
) -> DetectedRulers {
    let detect = |orientation| match detect_ruler(lines, orientation, sampler, params) {
        Ok(r) => Some(r),
        Err(err) => {
            debug!("{err}");
            None
        }
    };
    DetectedRulers {
        x: detect(Orientation::Horizontal),
        y: detect(Orientation::Vertical),
    }
}

/// Topmost sufficiently long near-horizontal line inside `region`.
pub fn detect_base_line(
    lines: &[LineSegment],
    region: &Region,
    params: &LineClassifierParams,
) -> Option<BaseLine> {
    let min_len = params
        .min_base_line_length_px
        .max(params.min_base_line_width_fraction * region.width());

    let best = lines
        .iter()
        .filter(|l| classify_segment(l, params.angle_tolerance_deg) == Some(Orientation::Horizontal))
        .filter(|l| l.length() >= min_len && region.contains(l.midpoint()))
        .min_by(|a, b| a.mean_y().total_cmp(&b.mean_y()));

    match best {
        Some(line) => {
            debug!("base line at y = {:.1} (length {:.1})", line.mean_y(), line.length());
            Some(BaseLine::new(line.mean_y()))
        }
        None => {
            warn!("no base line longer than {min_len:.1} px in the search region");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_handles_both_directions() {
        let tol = 20.0;
        let h = |x0, y0, x1, y1| classify_segment(&LineSegment::from_coords(x0, y0, x1, y1), tol);
        assert_eq!(h(0.0, 0.0, 100.0, 10.0), Some(Orientation::Horizontal));
        assert_eq!(h(100.0, 10.0, 0.0, 0.0), Some(Orientation::Horizontal));
        assert_eq!(h(0.0, 0.0, 10.0, 100.0), Some(Orientation::Vertical));
        assert_eq!(h(0.0, 100.0, 10.0, 0.0), Some(Orientation::Vertical));
        assert_eq!(h(0.0, 0.0, 100.0, 100.0), None);
        assert_eq!(h(5.0, 5.0, 5.0, 5.0), None);
    }

    #[test]
    fn base_line_prefers_topmost_long_line() {
        let lines = [
            LineSegment::from_coords(0.0, 450.0, 300.0, 452.0),
            LineSegment::from_coords(0.0, 420.0, 300.0, 420.0),
            // Too short.
            LineSegment::from_coords(0.0, 405.0, 30.0, 405.0),
            // Outside the region.
            LineSegment::from_coords(0.0, 100.0, 300.0, 100.0),
            // Vertical.
            LineSegment::from_coords(10.0, 400.0, 10.0, 480.0),
        ];
        let region = Region::new(0.0, 400.0, 320.0, 480.0);
        let base = detect_base_line(&lines, &region, &LineClassifierParams::default())
            .expect("base line");
        assert_eq!(base.pixel_y, 420.0);
        assert_eq!(base.real_value_mm, 0.0);

        assert!(detect_base_line(&lines[2..3], &region, &LineClassifierParams::default()).is_none());
    }
}
