//! Tick extraction from a sampled intensity profile.
//!
//! Ticks on a ruler are dark marks, so they show up as local minima of the
//! mean intensity measured across the ruler. The profile is sampled at one
//! pixel steps along the ruler's dominant axis, smoothed, and searched for
//! prominent minima. Spacing outliers are then removed relative to the median
//! spacing, which is taken as the unit interval.

use crate::Ruler;
use log::debug;
use photogauge_core::signal::{local_minima, median, moving_average};
use photogauge_core::{Axis, LineSegment, MeasureError, Orientation, ProfileSampler};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters for tick extraction and unit-interval estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickParams {
    /// Moving-average window applied to the raw profile.
    pub smoothing_window: usize,
    /// Minimal distance between accepted minima (pixels).
    pub min_distance_px: usize,
    /// Minimal minimum prominence on the 0..255 intensity scale.
    pub min_prominence: f64,
    /// Maximal relative deviation of a spacing from the median spacing.
    pub spacing_tolerance: f64,
    /// Minimal tick count both before and after spacing filtering.
    pub min_ticks: usize,
    /// Real distance between consecutive ticks (mm).
    pub unit_interval_mm: f64,
    /// Observed `(pixel, value)` pairs needed to prefer a regression fit.
    pub regression_min_pairs: usize,
}

impl Default for TickParams {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            min_distance_px: 15,
            min_prominence: 20.0,
            spacing_tolerance: 0.4,
            min_ticks: 3,
            unit_interval_mm: 10.0, // 1 cm marks
            regression_min_pairs: 4,
        }
    }
}

/// Ticks kept along one candidate segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickExtraction {
    /// Absolute coordinates along the dominant axis of the kept ticks.
    pub positions: Vec<f64>,
    /// Number of minima before spacing filtering.
    pub raw_count: usize,
    /// Median spacing of the raw minima, i.e. the unit interval in pixels.
    pub median_spacing_px: f64,
}

/// Sample the strip intensity at 1 px steps along the dominant axis of `segment`.
///
/// Returns the coordinate of the first sample along `axis` and the profile.
/// Samples the sampler cannot provide are filled from their nearest
/// preceding (or, at the start, following) valid neighbour. `None` when no
/// sample is valid or the segment is degenerate.
pub fn sample_profile(
    segment: &LineSegment,
    orientation: Orientation,
    sampler: &(impl ProfileSampler + ?Sized),
) -> Option<(f64, Vec<f64>)> {
    if !segment.is_well_formed() {
        return None;
    }
    let axis = orientation.axis();
    let seg = segment.oriented_along(axis);
    let a0 = axis.coord(seg.start);
    let span = axis.coord(seg.end) - a0;
    if span < 1.0 {
        return None;
    }
    let n = span.floor() as usize + 1;

    let raw: Vec<Option<f64>> = (0..n)
        .map(|k| {
            let p = seg.point_at(k as f64 / span);
            sampler.strip_mean(p, orientation).filter(|v| v.is_finite())
        })
        .collect();

    let first_valid = raw.iter().flatten().next().copied()?;
    let mut last = first_valid;
    let profile = raw
        .into_iter()
        .map(|v| {
            if let Some(v) = v {
                last = v;
            }
            last
        })
        .collect();
    Some((a0, profile))
}

/// Keep the first tick, then each tick whose spacing from the last *kept*
/// tick deviates from `median_spacing` by less than `tolerance` (relative).
pub fn filter_ticks_by_spacing(positions: &[f64], median_spacing: f64, tolerance: f64) -> Vec<f64> {
    let Some(&first) = positions.first() else {
        return Vec::new();
    };
    if median_spacing <= 0.0 {
        return vec![first];
    }
    let mut kept = vec![first];
    for &p in &positions[1..] {
        let last = kept[kept.len() - 1];
        let deviation = ((p - last) - median_spacing).abs() / median_spacing;
        if deviation < tolerance {
            kept.push(p);
        }
    }
    kept
}

/// Extract tick positions from a profile starting at axis coordinate `origin`.
pub fn extract_ticks(
    origin: f64,
    profile: &[f64],
    params: &TickParams,
) -> Result<TickExtraction, MeasureError> {
    let smoothed = moving_average(profile, params.smoothing_window);
    let minima = local_minima(&smoothed, params.min_distance_px, params.min_prominence);
    if minima.len() < params.min_ticks {
        return Err(MeasureError::detection(
            "tick extraction",
            format!(
                "found {} ticks, need {}; pick another ruler line or mark its endpoints",
                minima.len(),
                params.min_ticks
            ),
        ));
    }

    let raw: Vec<f64> = minima.iter().map(|&i| origin + i as f64).collect();
    let spacings: Vec<f64> = raw.windows(2).map(|w| w[1] - w[0]).collect();
    let median_spacing_px = median(&spacings);

    let positions = filter_ticks_by_spacing(&raw, median_spacing_px, params.spacing_tolerance);
    debug!(
        "ticks: {} raw, {} kept, median spacing {:.2} px",
        raw.len(),
        positions.len(),
        median_spacing_px
    );
    if positions.len() < params.min_ticks {
        return Err(MeasureError::detection(
            "tick spacing",
            format!(
                "only {} evenly spaced ticks survived; pick another ruler line",
                positions.len()
            ),
        ));
    }

    Ok(TickExtraction {
        positions,
        raw_count: raw.len(),
        median_spacing_px,
    })
}

/// Full tick calibration of one candidate segment.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(sampler, params), fields(length = segment.length()))
)]
pub fn calibrate_segment(
    segment: &LineSegment,
    orientation: Orientation,
    sampler: &(impl ProfileSampler + ?Sized),
    params: &TickParams,
) -> Result<Ruler, MeasureError> {
    let axis: Axis = orientation.axis();
    let (origin, profile) = sample_profile(segment, orientation, sampler).ok_or_else(|| {
        MeasureError::detection("intensity profile", "ruler line lies outside the image")
    })?;
    let ticks = extract_ticks(origin, &profile, params)?;
    Ruler::from_tick_positions(
        segment.oriented_along(axis),
        axis,
        &ticks.positions,
        ticks.median_spacing_px,
        params.unit_interval_mm,
    )
}
