//! Mutable calibration and measurement state.
//!
//! Detection runs as a pass over an immutable [`DetectionSnapshot`] of the
//! calibration. Passes can be computed off the owning thread and are applied
//! back in ticket order: a pass older than the last applied one is dropped.

use crate::io::MeasureConfig;
use crate::payload::{ExternalAnalysis, ResolvedCalibration};
use log::{debug, info};
use photogauge_core::{
    Axis, MeasureError, PerspectiveCorrection, PlanarCalibration, PlanarReference, Point2,
};
use photogauge_objects::{
    detect_objects, objects_from_observations, CategoryThresholds, Contour, DetectedObject,
    MeasurementScale, ObjectDetectionParams, ObjectObservation,
};
use photogauge_ruler::{BaseLine, DetectedRulers, Ruler, ScaleMode, TickParams};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome of a detection pass. An empty result is not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Found(usize),
    NoObjectsFound,
}

impl DetectionStatus {
    fn of(count: usize) -> Self {
        if count == 0 {
            Self::NoObjectsFound
        } else {
            Self::Found(count)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub pass: u64,
    pub status: DetectionStatus,
}

/// Calibration state frozen at the start of a pass.
#[derive(Clone, Debug)]
pub struct DetectionSnapshot {
    pass: u64,
    rulers: DetectedRulers,
    base_line: Option<BaseLine>,
    planar: Option<PlanarCalibration>,
    thresholds: CategoryThresholds,
    scale_mode: ScaleMode,
    params: ObjectDetectionParams,
}

/// Objects measured against one snapshot, waiting to be applied.
#[derive(Clone, Debug)]
pub struct DetectionPass {
    pass: u64,
    objects: Vec<DetectedObject>,
}

impl DetectionPass {
    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn objects(&self) -> &[DetectedObject] {
        &self.objects
    }
}

/// Scale used for heights.
///
/// A measured ruler (Y before X, square pixels) wins over the planar
/// reference. A fallback ruler, whose length is only assumed, ranks below it.
fn active_scale_of<'a>(
    rulers: &'a DetectedRulers,
    planar: Option<&PlanarCalibration>,
    mode: ScaleMode,
) -> Result<MeasurementScale<'a>, MeasureError> {
    let ruler = |fallback: bool| {
        [rulers.y.as_ref(), rulers.x.as_ref()]
            .into_iter()
            .flatten()
            .find(|r| r.is_fallback() == fallback)
    };
    if let Some(ruler) = ruler(false) {
        return Ok(MeasurementScale::Ruler { ruler, mode });
    }
    if let Some(p) = planar {
        return Ok(MeasurementScale::Uniform {
            px_per_mm: p.scale_px_per_mm,
        });
    }
    match ruler(true) {
        Some(ruler) => Ok(MeasurementScale::Ruler { ruler, mode }),
        None => Err(MeasureError::CalibrationMissing {
            what: "ruler or planar reference",
        }),
    }
}

impl DetectionSnapshot {
    pub fn pass(&self) -> u64 {
        self.pass
    }

    fn finish(&self, mut objects: Vec<DetectedObject>, scale: &MeasurementScale<'_>) -> DetectionPass {
        let perspective = self.planar.as_ref().map(PerspectiveCorrection::from);
        if perspective.is_some() {
            for obj in &mut objects {
                obj.recompute(
                    self.base_line.as_ref(),
                    scale,
                    &self.thresholds,
                    perspective.as_ref(),
                );
            }
        }
        DetectionPass {
            pass: self.pass,
            objects,
        }
    }

    /// Measure external contours.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(pass = self.pass, contours = contours.len()))
    )]
    pub fn run(&self, contours: &[Contour]) -> Result<DetectionPass, MeasureError> {
        let scale = active_scale_of(&self.rulers, self.planar.as_ref(), self.scale_mode)?;
        let objects = detect_objects(
            contours,
            &scale,
            self.base_line.as_ref(),
            &self.thresholds,
            &self.params,
        );
        Ok(self.finish(objects, &scale))
    }

    /// Measure externally observed objects.
    pub fn run_observations(
        &self,
        observations: &[ObjectObservation],
    ) -> Result<DetectionPass, MeasureError> {
        let scale = active_scale_of(&self.rulers, self.planar.as_ref(), self.scale_mode)?;
        let objects = objects_from_observations(
            observations,
            &scale,
            self.base_line.as_ref(),
            &self.thresholds,
            &self.params,
        );
        Ok(self.finish(objects, &scale))
    }
}

/// Rulers, base line, thresholds and the objects measured against them.
#[derive(Clone, Debug, Default)]
pub struct CalibrationSession {
    rulers: DetectedRulers,
    base_line: Option<BaseLine>,
    planar: Option<PlanarCalibration>,
    thresholds: CategoryThresholds,
    scale_mode: ScaleMode,
    object_params: ObjectDetectionParams,
    tick_params: TickParams,
    objects: Vec<DetectedObject>,
    next_pass: u64,
    applied_pass: Option<u64>,
}

impl CalibrationSession {
    pub fn new(config: &MeasureConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            scale_mode: config.scale_mode,
            object_params: config.objects.clone(),
            tick_params: config.lines.ticks.clone(),
            ..Self::default()
        }
    }

    pub fn rulers(&self) -> &DetectedRulers {
        &self.rulers
    }

    pub fn ruler(&self, axis: Axis) -> Option<&Ruler> {
        match axis {
            Axis::X => self.rulers.x.as_ref(),
            Axis::Y => self.rulers.y.as_ref(),
        }
    }

    pub fn base_line(&self) -> Option<&BaseLine> {
        self.base_line.as_ref()
    }

    pub fn planar(&self) -> Option<&PlanarCalibration> {
        self.planar.as_ref()
    }

    pub fn thresholds(&self) -> &CategoryThresholds {
        &self.thresholds
    }

    pub fn scale_mode(&self) -> ScaleMode {
        self.scale_mode
    }

    /// All objects of the last applied pass, removed ones included.
    pub fn objects(&self) -> &[DetectedObject] {
        &self.objects
    }

    pub fn active_objects(&self) -> impl Iterator<Item = &DetectedObject> {
        self.objects.iter().filter(|o| !o.is_removed())
    }

    pub fn object(&self, id: u32) -> Option<&DetectedObject> {
        self.active_objects().find(|o| o.id == id)
    }

    /// Scale currently used for heights.
    pub fn active_scale(&self) -> Result<MeasurementScale<'_>, MeasureError> {
        active_scale_of(&self.rulers, self.planar.as_ref(), self.scale_mode)
    }

    pub fn perspective(&self) -> Option<PerspectiveCorrection> {
        self.planar.as_ref().map(PerspectiveCorrection::from)
    }

    /// Status of the current object list.
    pub fn status(&self) -> DetectionStatus {
        DetectionStatus::of(self.active_objects().count())
    }

    /// Apply `change` and recompute. When either fails the session is left
    /// exactly as it was.
    fn update(
        &mut self,
        change: impl FnOnce(&mut Self) -> Result<(), MeasureError>,
    ) -> Result<(), MeasureError> {
        let before = self.clone();
        let result = change(self).and_then(|()| self.recompute());
        if result.is_err() {
            *self = before;
        }
        result
    }

    /// Install a ruler on its axis, replacing any previous one.
    pub fn set_ruler(&mut self, ruler: Ruler) -> Result<(), MeasureError> {
        debug!(
            "{:?} ruler set: {:.4} px/mm ({:?})",
            ruler.axis, ruler.scale_px_per_mm, ruler.source
        );
        self.update(|s| {
            match ruler.axis {
                Axis::X => s.rulers.x = Some(ruler),
                Axis::Y => s.rulers.y = Some(ruler),
            }
            Ok(())
        })
    }

    /// Drop the ruler of `axis`.
    ///
    /// Refused with `CalibrationMissing` while measured objects would be left
    /// without any scale.
    pub fn clear_ruler(&mut self, axis: Axis) -> Result<(), MeasureError> {
        self.update(|s| {
            match axis {
                Axis::X => s.rulers.x = None,
                Axis::Y => s.rulers.y = None,
            }
            Ok(())
        })
    }

    pub fn set_base_line(&mut self, base_line: BaseLine) -> Result<(), MeasureError> {
        self.update(|s| {
            s.base_line = Some(base_line);
            Ok(())
        })
    }

    /// Drag the base line to a new row, keeping its real value.
    pub fn move_base_line(&mut self, pixel_y: f64) -> Result<(), MeasureError> {
        let real_value_mm = self.base_line.map_or(0.0, |b| b.real_value_mm);
        self.set_base_line(BaseLine {
            pixel_y,
            real_value_mm,
        })
    }

    pub fn set_thresholds(&mut self, thresholds: CategoryThresholds) -> Result<(), MeasureError> {
        self.update(|s| {
            s.thresholds = thresholds;
            Ok(())
        })
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) -> Result<(), MeasureError> {
        self.update(|s| {
            s.scale_mode = mode;
            Ok(())
        })
    }

    pub fn set_planar_reference(&mut self, reference: &PlanarReference) -> Result<(), MeasureError> {
        let cal = reference.resolve()?;
        debug!(
            "planar reference: {:.4} px/mm, perspective ratio {:.3}",
            cal.scale_px_per_mm, cal.perspective_ratio
        );
        self.set_planar(cal)
    }

    fn set_planar(&mut self, cal: PlanarCalibration) -> Result<(), MeasureError> {
        self.update(|s| {
            s.planar = Some(cal);
            Ok(())
        })
    }

    /// Drop the planar reference; refused like [`Self::clear_ruler`].
    pub fn clear_planar_reference(&mut self) -> Result<(), MeasureError> {
        self.update(|s| {
            s.planar = None;
            Ok(())
        })
    }

    /// Install a resolved external calibration.
    pub fn apply_calibration(&mut self, cal: ResolvedCalibration) -> Result<(), MeasureError> {
        match cal {
            ResolvedCalibration::Ruler(ruler) => self.set_ruler(ruler),
            ResolvedCalibration::Planar(planar) => self.set_planar(planar),
        }
    }

    /// Recompute height and category of every non-removed object.
    ///
    /// Count, ids and states are preserved.
    pub fn recompute(&mut self) -> Result<(), MeasureError> {
        if self.objects.is_empty() {
            return Ok(());
        }
        let scale = active_scale_of(&self.rulers, self.planar.as_ref(), self.scale_mode)?;
        let perspective = self.planar.as_ref().map(PerspectiveCorrection::from);
        for obj in &mut self.objects {
            obj.recompute(
                self.base_line.as_ref(),
                &scale,
                &self.thresholds,
                perspective.as_ref(),
            );
        }
        Ok(())
    }

    /// Freeze the current calibration for a new pass.
    pub fn begin_pass(&mut self) -> DetectionSnapshot {
        self.next_pass += 1;
        DetectionSnapshot {
            pass: self.next_pass,
            rulers: self.rulers.clone(),
            base_line: self.base_line,
            planar: self.planar,
            thresholds: self.thresholds,
            scale_mode: self.scale_mode,
            params: self.object_params.clone(),
        }
    }

    /// Replace the object list with a finished pass.
    ///
    /// Returns `None` when a newer pass was already applied; the stale result
    /// is discarded.
    pub fn apply_pass(&mut self, pass: DetectionPass) -> Option<DetectionSummary> {
        if self.applied_pass.is_some_and(|applied| pass.pass <= applied) {
            debug!("discarding stale pass {}", pass.pass);
            return None;
        }
        self.applied_pass = Some(pass.pass);
        self.objects = pass.objects;
        let summary = DetectionSummary {
            pass: pass.pass,
            status: self.status(),
        };
        info!("pass {}: {:?}", summary.pass, summary.status);
        Some(summary)
    }

    fn apply_fresh(&mut self, pass: DetectionPass) -> Result<DetectionSummary, MeasureError> {
        let id = pass.pass;
        self.apply_pass(pass).ok_or_else(|| {
            MeasureError::detection(
                "detection pass",
                format!("pass {id} was superseded; rerun detection"),
            )
        })
    }

    /// Run a full pass over external contours and apply it.
    pub fn run_detection(&mut self, contours: &[Contour]) -> Result<DetectionSummary, MeasureError> {
        let pass = self.begin_pass().run(contours)?;
        self.apply_fresh(pass)
    }

    /// Ingest an externally computed analysis through the regular
    /// calibration and object construction paths.
    pub fn ingest(&mut self, analysis: &ExternalAnalysis) -> Result<DetectionSummary, MeasureError> {
        for payload in &analysis.calibration {
            let cal = payload.resolve(&self.tick_params)?;
            self.apply_calibration(cal)?;
        }
        if let Some(pixel_y) = analysis.base_line_px {
            self.move_base_line(pixel_y)?;
        }
        let pass = self.begin_pass().run_observations(&analysis.objects)?;
        self.apply_fresh(pass)
    }

    fn object_mut(&mut self, id: u32) -> Option<&mut DetectedObject> {
        self.objects
            .iter_mut()
            .find(|o| o.id == id && !o.is_removed())
    }

    /// Edit one live object and recompute. `Ok(false)` when no live object
    /// has this id.
    fn update_object(
        &mut self,
        id: u32,
        edit: impl FnOnce(&mut DetectedObject) -> Result<(), MeasureError>,
    ) -> Result<bool, MeasureError> {
        if self.object(id).is_none() {
            return Ok(false);
        }
        self.update(|s| s.object_mut(id).map_or(Ok(()), edit))?;
        Ok(true)
    }

    /// Replace an object's geometry with hand-placed corners.
    pub fn adjust_object(&mut self, id: u32, vertices: [Point2<f64>; 4]) -> Result<bool, MeasureError> {
        self.update_object(id, |obj| obj.adjust(vertices))
    }

    /// Move an object's top edge.
    pub fn move_object_top(&mut self, id: u32, top_y: f64) -> Result<bool, MeasureError> {
        self.update_object(id, |obj| {
            obj.adjust_top(top_y);
            Ok(())
        })
    }

    /// Mark an object removed. Ids of the others are kept until the next pass.
    pub fn remove_object(&mut self, id: u32) -> bool {
        match self.object_mut(id) {
            Some(obj) => {
                obj.remove();
                true
            }
            None => false,
        }
    }

    /// Attach (or clear) a depth ratio for perspective correction.
    pub fn set_depth_ratio(&mut self, id: u32, depth_ratio: Option<f64>) -> Result<bool, MeasureError> {
        self.update_object(id, |obj| {
            obj.depth_ratio = depth_ratio.filter(|d| d.is_finite());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use photogauge_objects::{Category, ObjectState};
    use photogauge_ruler::TickObservation;

    fn column(cx: f64, top: f64, bottom: f64) -> Contour {
        Contour::new(vec![
            Point2::new(cx - 20.0, top),
            Point2::new(cx + 20.0, top),
            Point2::new(cx + 20.0, bottom),
            Point2::new(cx - 20.0, bottom),
        ])
    }

    fn calibrated() -> CalibrationSession {
        let obs: Vec<TickObservation> = (0..5)
            .map(|k| TickObservation {
                pixel: 100.0 + 50.0 * k as f64,
                value_mm: 100.0 * k as f64,
            })
            .collect();
        let mut s = CalibrationSession::new(&MeasureConfig::default());
        s.set_ruler(Ruler::from_observations(None, Axis::Y, &obs, 4).expect("ruler"))
            .expect("set ruler");
        s.set_base_line(BaseLine::new(500.0)).expect("base");
        s
    }

    #[test]
    fn detection_without_scale_is_calibration_missing() {
        let mut s = CalibrationSession::default();
        let err = s.run_detection(&[column(100.0, 300.0, 500.0)]).expect_err("no scale");
        assert!(matches!(err, MeasureError::CalibrationMissing { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn empty_pass_reports_no_objects() {
        let mut s = calibrated();
        let summary = s.run_detection(&[]).expect("pass");
        assert_eq!(summary.status, DetectionStatus::NoObjectsFound);
    }

    #[test]
    fn stale_pass_is_discarded() {
        let mut s = calibrated();
        let older = s.begin_pass();
        let newer = s.begin_pass();
        let newer = newer.run(&[column(100.0, 300.0, 500.0)]).expect("newer");
        let older = older
            .run(&[column(100.0, 300.0, 500.0), column(300.0, 300.0, 500.0)])
            .expect("older");
        assert!(s.apply_pass(newer).is_some());
        assert!(s.apply_pass(older).is_none());
        assert_eq!(s.objects().len(), 1);
    }

    #[test]
    fn remove_and_adjust_keep_ids() {
        let mut s = calibrated();
        s.run_detection(&[column(100.0, 300.0, 500.0), column(300.0, 420.0, 500.0)])
            .expect("pass");
        assert!(s.remove_object(1));
        assert!(!s.remove_object(1));
        assert_eq!(s.status(), DetectionStatus::Found(1));

        assert!(s.move_object_top(2, 380.0).expect("adjust"));
        let obj = s.object(2).expect("object 2");
        assert_eq!(obj.state, ObjectState::Adjusted);
        assert_abs_diff_eq!(obj.height_mm, 240.0, epsilon = 1e-9);
        assert_eq!(obj.category, Category::B);
        assert!(!s.move_object_top(7, 10.0).expect("missing id"));
    }

    #[test]
    fn depth_ratio_needs_planar_reference() {
        let mut s = calibrated();
        s.run_detection(&[column(100.0, 300.0, 500.0)]).expect("pass");
        assert!(s.set_depth_ratio(1, Some(1.0)).expect("set"));
        assert_eq!(s.object(1).and_then(|o| o.corrected_height_mm), None);

        let mut reference = PlanarReference::new(
            [
                Point2::new(100.0, 100.0),
                Point2::new(300.0, 100.0),
                Point2::new(350.0, 200.0),
                Point2::new(50.0, 200.0),
            ],
            100.0,
            50.0,
        );
        reference.near_edge_px = Some(300.0);
        reference.far_edge_px = Some(200.0);
        s.set_planar_reference(&reference).expect("planar");
        // The ruler keeps precedence; the planar reference only adds the ratio.
        let obj = s.object(1).expect("object");
        assert_abs_diff_eq!(obj.height_mm, 400.0, epsilon = 1e-9);
        // 200 px at 2 px/mm on the far plane, shrunk by 1.5 on the near plane.
        assert_abs_diff_eq!(obj.corrected_height_mm.unwrap_or_default(), 100.0 / 1.5, epsilon = 1e-9);
    }

    fn planar_at_two_px_per_mm() -> PlanarReference {
        // 200 px top edge over a 100 mm wide rectangle.
        PlanarReference::new(
            [
                Point2::new(100.0, 100.0),
                Point2::new(300.0, 100.0),
                Point2::new(300.0, 200.0),
                Point2::new(100.0, 200.0),
            ],
            100.0,
            50.0,
        )
    }

    #[test]
    fn fallback_ruler_ranks_below_planar_reference() {
        let mut s = CalibrationSession::default();
        let edge = photogauge_core::LineSegment::from_coords(0.0, 500.0, 600.0, 500.0);
        let fallback = Ruler::two_point(edge, Axis::X, 400.0).expect("ruler");
        s.set_ruler(fallback).expect("ruler");
        s.set_planar_reference(&planar_at_two_px_per_mm()).expect("planar");
        assert!(matches!(
            s.active_scale(),
            Ok(MeasurementScale::Uniform { px_per_mm }) if (px_per_mm - 2.0).abs() < 1e-9
        ));

        // A measured ruler still wins.
        let measured = calibrated();
        let mut s = measured.clone();
        s.set_planar_reference(&planar_at_two_px_per_mm()).expect("planar");
        assert!(matches!(s.active_scale(), Ok(MeasurementScale::Ruler { .. })));
    }

    #[test]
    fn refused_calibration_change_leaves_session_untouched() {
        let mut s = calibrated();
        s.run_detection(&[column(100.0, 300.0, 500.0)]).expect("pass");
        let err = s.clear_ruler(Axis::Y).expect_err("last scale");
        assert!(matches!(err, MeasureError::CalibrationMissing { .. }));

        assert!(s.ruler(Axis::Y).is_some());
        assert!(s.active_scale().is_ok());
        assert_eq!(s.status(), DetectionStatus::Found(1));
        assert_abs_diff_eq!(s.object(1).map_or(0.0, |o| o.height_mm), 400.0, epsilon = 1e-9);

        // With another scale in place the ruler can go.
        s.set_planar_reference(&planar_at_two_px_per_mm()).expect("planar");
        s.clear_ruler(Axis::Y).expect("planar takes over");
        assert_abs_diff_eq!(s.object(1).map_or(0.0, |o| o.height_mm), 100.0, epsilon = 1e-9);
        assert!(s.clear_planar_reference().is_err());
        assert!(s.planar().is_some());
    }

    #[test]
    fn failed_adjustment_keeps_previous_geometry() {
        let mut s = calibrated();
        s.run_detection(&[column(100.0, 300.0, 500.0)]).expect("pass");
        let p = Point2::new(10.0, 10.0);
        assert!(s.adjust_object(1, [p; 4]).is_err());
        let obj = s.object(1).expect("object");
        assert_eq!(obj.state, ObjectState::Detected);
        assert_abs_diff_eq!(obj.top_y, 300.0, epsilon = 1e-9);
    }
}
