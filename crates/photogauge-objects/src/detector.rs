//! Object detection, measurement and categorization.
//!
//! Contours are filtered by area and elongation, boxed, anchored to the base
//! line and measured with the active [`MeasurementScale`]. Externally observed
//! objects enter the same path after the contour-level filters.

use crate::category::{category_of, Category, CategoryThresholds};
use crate::contour::{Contour, OrientedBox};
use crate::scale::MeasurementScale;
use log::{debug, warn};
use photogauge_core::{MeasureError, PerspectiveCorrection, Point2};
use photogauge_ruler::BaseLine;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Filters applied to candidate objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDetectionParams {
    /// Contours enclosing less area (px²) are noise.
    pub min_contour_area: f64,
    /// Minimal `longer / shorter` side ratio of the oriented box.
    pub min_aspect_ratio: f64,
    /// Max distance between an object's bottom and the base line (px).
    pub base_tolerance_px: f64,
    /// Heights below this are treated as noise (mm).
    pub min_height_mm: f64,
}

impl Default for ObjectDetectionParams {
    fn default() -> Self {
        Self {
            min_contour_area: 500.0,
            min_aspect_ratio: 1.2,
            base_tolerance_px: 20.0,
            min_height_mm: 10.0,
        }
    }
}

/// Lifecycle of a measured object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    #[default]
    Detected,
    /// Geometry edited by hand.
    Adjusted,
    /// Terminal; excluded from recomputation and reports.
    Removed,
}

/// Raw per-object observation from an external analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectObservation {
    pub top_y: f64,
    pub bottom_y: f64,
    pub center_x: f64,
    #[serde(default, rename = "box")]
    pub oriented_box: Option<OrientedBox>,
    #[serde(default)]
    pub depth_ratio: Option<f64>,
}

impl ObjectObservation {
    fn is_finite(&self) -> bool {
        self.top_y.is_finite() && self.bottom_y.is_finite() && self.center_x.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// 1-based position in ascending `center_x` order; reassigned every pass.
    pub id: u32,
    pub oriented_box: OrientedBox,
    pub top_y: f64,
    pub bottom_y: f64,
    pub center_x: f64,
    /// Pixels from the top edge up to the base line.
    pub height_px: f64,
    pub height_mm: f64,
    pub category: Category,
    pub state: ObjectState,
    #[serde(default)]
    pub depth_ratio: Option<f64>,
    /// Perspective-corrected height; set when a depth ratio and a planar
    /// reference are both available.
    #[serde(default)]
    pub corrected_height_mm: Option<f64>,
}

impl DetectedObject {
    fn from_box(oriented_box: OrientedBox, depth_ratio: Option<f64>) -> Self {
        Self {
            id: 0,
            top_y: oriented_box.top_y(),
            bottom_y: oriented_box.bottom_y(),
            center_x: oriented_box.center_x(),
            oriented_box,
            height_px: 0.0,
            height_mm: 0.0,
            category: Category::A,
            state: ObjectState::Detected,
            depth_ratio,
            corrected_height_mm: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.state == ObjectState::Removed
    }

    /// Recompute height and category. Removed objects are left untouched and
    /// the state never changes.
    ///
    /// Without a base line the object's own bottom edge is the reference.
    pub fn recompute(
        &mut self,
        base: Option<&BaseLine>,
        scale: &MeasurementScale<'_>,
        thresholds: &CategoryThresholds,
        perspective: Option<&PerspectiveCorrection>,
    ) {
        if self.is_removed() {
            return;
        }
        let (base_y, base_mm) = base.map_or((self.bottom_y, 0.0), |b| (b.pixel_y, b.real_value_mm));
        self.height_px = base_y - self.top_y;
        self.height_mm = base_mm + scale.height_mm(self.top_y, base_y);
        self.category = category_of(self.height_mm, thresholds);
        self.corrected_height_mm = match (perspective, self.depth_ratio) {
            (Some(p), Some(d)) => Some(p.corrected_mm(self.height_px, d)),
            _ => None,
        };
    }

    /// Replace the geometry with four hand-placed corners.
    ///
    /// The caller recomputes height afterwards. A removed object stays removed.
    pub fn adjust(&mut self, vertices: [Point2<f64>; 4]) -> Result<(), MeasureError> {
        if self.is_removed() {
            return Ok(());
        }
        let oriented_box = OrientedBox::from_vertices(vertices).ok_or_else(|| {
            MeasureError::degenerate("object corners", "place the four corners apart")
        })?;
        self.top_y = oriented_box.top_y();
        self.bottom_y = oriented_box.bottom_y();
        self.center_x = oriented_box.center_x();
        self.oriented_box = oriented_box;
        self.state = ObjectState::Adjusted;
        Ok(())
    }

    /// Move only the top edge, keeping the bottom and horizontal extent.
    pub fn adjust_top(&mut self, top_y: f64) {
        if self.is_removed() || !top_y.is_finite() {
            return;
        }
        let width = self.oriented_box.shorter_side();
        self.top_y = top_y;
        self.oriented_box = OrientedBox::axis_aligned(self.center_x, top_y, self.bottom_y, width);
        self.state = ObjectState::Adjusted;
    }

    pub fn remove(&mut self) {
        self.state = ObjectState::Removed;
    }
}

/// Sort by ascending `center_x` and number 1..N.
pub fn assign_ids(objects: &mut [DetectedObject]) {
    objects.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
    for (k, obj) in objects.iter_mut().enumerate() {
        obj.id = k as u32 + 1;
    }
}

struct Measurer<'a, 's> {
    scale: &'a MeasurementScale<'s>,
    base: Option<&'a BaseLine>,
    thresholds: &'a CategoryThresholds,
    params: &'a ObjectDetectionParams,
}

impl Measurer<'_, '_> {
    fn measure(&self, mut obj: DetectedObject) -> Option<DetectedObject> {
        if let Some(base) = self.base {
            let offset = (obj.bottom_y - base.pixel_y).abs();
            if offset > self.params.base_tolerance_px {
                debug!("object at x={:.1}: bottom {offset:.1} px off the base line", obj.center_x);
                return None;
            }
        }
        obj.recompute(self.base, self.scale, self.thresholds, None);
        if !obj.height_mm.is_finite() || obj.height_mm < self.params.min_height_mm {
            debug!("object at x={:.1}: height {:.1} mm is noise", obj.center_x, obj.height_mm);
            return None;
        }
        Some(obj)
    }

    fn finish(&self, mut objects: Vec<DetectedObject>) -> Vec<DetectedObject> {
        assign_ids(&mut objects);
        if objects.is_empty() {
            debug!("no objects survived filtering");
        }
        objects
    }
}

/// Measure and categorize objects from external contours.
///
/// An empty result is a valid outcome. Without a base line each object is
/// measured from its own bottom edge and the anchoring filter is skipped.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(contours = contours.len()))
)]
pub fn detect_objects(
    contours: &[Contour],
    scale: &MeasurementScale<'_>,
    base: Option<&BaseLine>,
    thresholds: &CategoryThresholds,
    params: &ObjectDetectionParams,
) -> Vec<DetectedObject> {
    if !scale.is_valid() {
        warn!("invalid scale {} px/mm; no objects measured", scale.px_per_mm());
        return Vec::new();
    }
    let m = Measurer {
        scale,
        base,
        thresholds,
        params,
    };

    let mut small = 0usize;
    let mut squat = 0usize;
    let mut objects = Vec::new();
    for contour in contours {
        if contour.area() < params.min_contour_area {
            small += 1;
            continue;
        }
        let Some(b) = contour.oriented_box() else {
            small += 1;
            continue;
        };
        if b.aspect_ratio() < params.min_aspect_ratio {
            squat += 1;
            continue;
        }
        if let Some(obj) = m.measure(DetectedObject::from_box(b, None)) {
            objects.push(obj);
        }
    }
    debug!(
        "objects: {} contours, {small} too small, {squat} not elongated, {} kept",
        contours.len(),
        objects.len()
    );
    m.finish(objects)
}

/// Measure externally observed objects through the same anchoring, noise and
/// ordering rules as [`detect_objects`].
pub fn objects_from_observations(
    observations: &[ObjectObservation],
    scale: &MeasurementScale<'_>,
    base: Option<&BaseLine>,
    thresholds: &CategoryThresholds,
    params: &ObjectDetectionParams,
) -> Vec<DetectedObject> {
    if !scale.is_valid() {
        warn!("invalid scale {} px/mm; no objects measured", scale.px_per_mm());
        return Vec::new();
    }
    let m = Measurer {
        scale,
        base,
        thresholds,
        params,
    };
    let objects = observations
        .iter()
        .filter(|o| o.is_finite())
        .filter_map(|o| {
            let b = o
                .oriented_box
                .unwrap_or_else(|| OrientedBox::axis_aligned(o.center_x, o.top_y, o.bottom_y, 0.0));
            let mut obj = DetectedObject::from_box(b, o.depth_ratio);
            obj.top_y = o.top_y.min(o.bottom_y);
            obj.bottom_y = o.top_y.max(o.bottom_y);
            obj.center_x = o.center_x;
            m.measure(obj)
        })
        .collect();
    m.finish(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Contour {
        Contour::new(vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ])
    }

    fn run(contours: &[Contour]) -> Vec<DetectedObject> {
        detect_objects(
            contours,
            &MeasurementScale::Uniform { px_per_mm: 0.5 },
            Some(&BaseLine::new(500.0)),
            &CategoryThresholds::default(),
            &ObjectDetectionParams::default(),
        )
    }

    #[test]
    fn filters_small_squat_and_floating_contours() {
        let objs = run(&[
            // 400 mm tall, anchored.
            rect(100.0, 300.0, 140.0, 500.0),
            // Area 100.
            rect(200.0, 490.0, 210.0, 500.0),
            // Square.
            rect(300.0, 300.0, 500.0, 500.0),
            // Floating 100 px above the base.
            rect(600.0, 200.0, 640.0, 400.0),
            // Anchored but only 4 mm tall.
            rect(700.0, 498.0, 800.0, 500.0),
        ]);
        assert_eq!(objs.len(), 1);
        let o = &objs[0];
        assert_eq!(o.id, 1);
        assert_abs_diff_eq!(o.height_px, 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(o.height_mm, 400.0, epsilon = 1e-9);
        assert_eq!(o.category, Category::C);
        assert_eq!(o.state, ObjectState::Detected);
    }

    #[test]
    fn bottom_within_tolerance_is_kept() {
        let objs = run(&[rect(100.0, 400.0, 140.0, 515.0)]);
        assert_eq!(objs.len(), 1);
        assert_abs_diff_eq!(objs[0].height_mm, 200.0, epsilon = 1e-9);
        assert_eq!(objs[0].category, Category::B);
    }

    #[test]
    fn empty_input_is_an_empty_result() {
        assert!(run(&[]).is_empty());
    }

    #[test]
    fn recompute_skips_removed_and_keeps_state() {
        let mut objs = run(&[rect(100.0, 300.0, 140.0, 500.0), rect(200.0, 420.0, 240.0, 500.0)]);
        objs[1].remove();
        let before = objs[1].clone();
        let base = BaseLine::new(480.0);
        let scale = MeasurementScale::Uniform { px_per_mm: 0.5 };
        let th = CategoryThresholds::default();
        for o in &mut objs {
            o.recompute(Some(&base), &scale, &th, None);
        }
        assert_abs_diff_eq!(objs[0].height_mm, 360.0, epsilon = 1e-9);
        assert_eq!(objs[0].state, ObjectState::Detected);
        assert_eq!(objs[1], before);
    }

    #[test]
    fn adjustment_refits_box_and_marks_state() {
        let mut objs = run(&[rect(100.0, 300.0, 140.0, 500.0)]);
        let o = &mut objs[0];
        o.adjust([
            Point2::new(100.0, 350.0),
            Point2::new(140.0, 350.0),
            Point2::new(140.0, 500.0),
            Point2::new(100.0, 500.0),
        ])
        .expect("valid corners");
        assert_eq!(o.state, ObjectState::Adjusted);
        assert_abs_diff_eq!(o.top_y, 350.0, epsilon = 1e-9);
        assert!(o.adjust([Point2::new(1.0, 1.0); 4]).is_err());

        o.remove();
        o.adjust_top(10.0);
        assert_eq!(o.state, ObjectState::Removed);
        assert_abs_diff_eq!(o.top_y, 350.0, epsilon = 1e-9);
    }

    #[test]
    fn perspective_correction_uses_depth_ratio() {
        let obs = [ObjectObservation {
            top_y: -100.0,
            bottom_y: 500.0,
            center_x: 10.0,
            oriented_box: None,
            depth_ratio: Some(1.0),
        }];
        let mut objs = objects_from_observations(
            &obs,
            &MeasurementScale::Uniform { px_per_mm: 2.0 },
            Some(&BaseLine::new(500.0)),
            &CategoryThresholds::default(),
            &ObjectDetectionParams::default(),
        );
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].corrected_height_mm, None);
        let pc = PerspectiveCorrection::new(2.0, 1.5).expect("valid");
        objs[0].recompute(
            Some(&BaseLine::new(500.0)),
            &MeasurementScale::Uniform { px_per_mm: 2.0 },
            &CategoryThresholds::default(),
            Some(&pc),
        );
        assert_abs_diff_eq!(objs[0].height_mm, 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(objs[0].corrected_height_mm.unwrap_or_default(), 200.0, epsilon = 1e-9);
    }
}
