//! JSON configuration, scene and report helpers.

use crate::payload::{CalibrationPayload, ExternalAnalysis};
use crate::session::{CalibrationSession, DetectionStatus};
use log::warn;
use photogauge_core::{Axis, LineSegment, PlanarReference, Point2, Region};
use photogauge_objects::{Category, CategoryThresholds, Contour, ObjectDetectionParams, ObjectState};
use photogauge_ruler::{LineClassifierParams, RulerSource, ScaleMode};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Every tunable of a measurement run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    pub lines: LineClassifierParams,
    pub objects: ObjectDetectionParams,
    pub thresholds: CategoryThresholds,
    pub scale_mode: ScaleMode,
    /// Half-width (px) of the strip averaged across a ruler when sampling.
    pub strip_half_width: usize,
    /// Base-line search region; the lower half of the image when unset.
    pub base_region: Option<Region>,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            lines: LineClassifierParams::default(),
            objects: ObjectDetectionParams::default(),
            thresholds: CategoryThresholds::default(),
            scale_mode: ScaleMode::default(),
            strip_half_width: 3,
            base_region: None,
        }
    }
}

impl MeasureConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_json(self, path)
    }
}

/// Collaborator output for one photograph.
///
/// Lines and contours come from external edge/line/contour extractors; an
/// [`ExternalAnalysis`] replaces them when a hosted service did the work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub image_width: Option<usize>,
    pub image_height: Option<usize>,
    /// Loaded size over original size.
    pub image_scale: f64,
    pub lines: Vec<LineSegment>,
    pub contours: Vec<Contour>,
    pub base_region: Option<Region>,
    pub base_line_px: Option<f64>,
    /// Manually supplied calibration; takes precedence over detection.
    pub calibration: Vec<CalibrationPayload>,
    pub planar_reference: Option<PlanarReference>,
    pub analysis: Option<ExternalAnalysis>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            image_width: None,
            image_height: None,
            image_scale: 1.0,
            lines: Vec::new(),
            contours: Vec::new(),
            base_region: None,
            base_line_px: None,
            calibration: Vec::new(),
            planar_reference: None,
            analysis: None,
        }
    }
}

impl Scene {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path)
    }

    /// Base-line search region: explicit, else the lower half of the image.
    pub fn base_region(&self) -> Option<Region> {
        self.base_region.or_else(|| {
            let (w, h) = (self.image_width? as f64, self.image_height? as f64);
            Some(Region::new(0.0, 0.5 * h, w, h))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RulerReport {
    pub axis: Axis,
    pub source: RulerSource,
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    pub zero_px: f64,
    pub scale_px_per_mm: f64,
    pub real_length_mm: f64,
    pub tick_count: usize,
    /// Built without tick evidence; ask for manual endpoints.
    pub fallback: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectReport {
    pub id: u32,
    pub state: ObjectState,
    pub category: Category,
    pub height_mm: f64,
    #[serde(default)]
    pub corrected_height_mm: Option<f64>,
    pub height_px: f64,
    pub top_y: f64,
    pub bottom_y: f64,
    pub center_x: f64,
    pub vertices: [Point2<f64>; 4],
}

/// Measurement results in original-image pixel space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub status: DetectionStatus,
    pub rulers: Vec<RulerReport>,
    #[serde(default)]
    pub base_line_px: Option<f64>,
    #[serde(default)]
    pub scale_px_per_mm: Option<f64>,
    #[serde(default)]
    pub perspective_ratio: Option<f64>,
    pub objects: Vec<ObjectReport>,
}

impl MeasurementReport {
    /// Snapshot a session. `image_scale` is the loaded/original size ratio;
    /// pixel quantities are divided by it, millimetres are unchanged.
    pub fn from_session(session: &CalibrationSession, image_scale: f64) -> Self {
        let k = if image_scale.is_finite() && image_scale > 0.0 {
            1.0 / image_scale
        } else {
            warn!("ignoring invalid image scale {image_scale}");
            1.0
        };
        let up = |p: Point2<f64>| Point2::new(p.x * k, p.y * k);

        let rulers = [Axis::X, Axis::Y]
            .into_iter()
            .filter_map(|axis| session.ruler(axis))
            .map(|r| RulerReport {
                axis: r.axis,
                source: r.source,
                start: up(r.line.start),
                end: up(r.line.end),
                zero_px: r.zero_px * k,
                scale_px_per_mm: r.scale_px_per_mm * k,
                real_length_mm: r.real_length_mm,
                tick_count: r.ticks.len(),
                fallback: r.is_fallback(),
            })
            .collect();

        let objects = session
            .active_objects()
            .map(|o| ObjectReport {
                id: o.id,
                state: o.state,
                category: o.category,
                height_mm: o.height_mm,
                corrected_height_mm: o.corrected_height_mm,
                height_px: o.height_px * k,
                top_y: o.top_y * k,
                bottom_y: o.bottom_y * k,
                center_x: o.center_x * k,
                vertices: o.oriented_box.vertices.map(up),
            })
            .collect();

        Self {
            status: session.status(),
            rulers,
            base_line_px: session.base_line().map(|b| b.pixel_y * k),
            scale_px_per_mm: session.active_scale().ok().map(|s| s.px_per_mm() * k),
            perspective_ratio: session.planar().map(|p| p.perspective_ratio),
            objects,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_json(self, path)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path)
    }
}
