//! Calibration payloads from external analyses.
//!
//! Whatever produced the geometry, it is resolved once into the canonical
//! [`Ruler`] or [`PlanarCalibration`] and then flows through the regular
//! session paths.

use photogauge_core::{Axis, LineSegment, MeasureError, PlanarCalibration, PlanarReference, Point2};
use photogauge_objects::ObjectObservation;
use photogauge_ruler::{Ruler, TickObservation, TickParams};
use serde::{Deserialize, Serialize};

fn default_axis() -> Axis {
    Axis::Y
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationPayload {
    /// Observed `(pixel, value)` tick pairs along one axis.
    TickList {
        #[serde(default = "default_axis")]
        axis: Axis,
        ticks: Vec<TickObservation>,
        #[serde(default)]
        line: Option<LineSegment>,
    },
    /// Ruler endpoints with a known real length.
    TwoPointEndpoints {
        #[serde(default = "default_axis")]
        axis: Axis,
        start: Point2<f64>,
        end: Point2<f64>,
        real_length_mm: f64,
    },
    /// Known-size planar rectangle, optionally with measured edge lengths.
    ExternalPlanarReference(PlanarReference),
}

/// A payload resolved into canonical calibration types.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedCalibration {
    Ruler(Ruler),
    Planar(PlanarCalibration),
}

impl CalibrationPayload {
    pub fn resolve(&self, ticks: &TickParams) -> Result<ResolvedCalibration, MeasureError> {
        match self {
            Self::TickList {
                axis,
                ticks: observations,
                line,
            } => Ruler::from_observations(*line, *axis, observations, ticks.regression_min_pairs)
                .map(ResolvedCalibration::Ruler),
            Self::TwoPointEndpoints {
                axis,
                start,
                end,
                real_length_mm,
            } => Ruler::two_point(LineSegment::new(*start, *end), *axis, *real_length_mm)
                .map(ResolvedCalibration::Ruler),
            Self::ExternalPlanarReference(reference) => {
                reference.resolve().map(ResolvedCalibration::Planar)
            }
        }
    }
}

/// Complete analysis submitted by an external vision service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalAnalysis {
    #[serde(default)]
    pub calibration: Vec<CalibrationPayload>,
    #[serde(default)]
    pub base_line_px: Option<f64>,
    #[serde(default)]
    pub objects: Vec<ObjectObservation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use photogauge_ruler::RulerSource;

    #[test]
    fn tick_list_accepts_service_field_names() {
        let json = r#"{
            "kind": "tick_list",
            "ticks": [
                {"pixel_position": 100.0, "unit_value": 0.0},
                {"pixel_position": 150.0, "unit_value": 100.0},
                {"pixel_position": 200.0, "unit_value": 200.0},
                {"pixel_position": 250.0, "unit_value": 300.0}
            ]
        }"#;
        let payload: CalibrationPayload = serde_json::from_str(json).expect("payload");
        let ResolvedCalibration::Ruler(ruler) =
            payload.resolve(&TickParams::default()).expect("ruler")
        else {
            panic!("expected a ruler");
        };
        assert_eq!(ruler.axis, Axis::Y);
        assert_eq!(ruler.source, RulerSource::Regression);
        assert_abs_diff_eq!(ruler.scale_px_per_mm, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn two_point_and_planar_payloads() {
        let two = CalibrationPayload::TwoPointEndpoints {
            axis: Axis::X,
            start: Point2::new(10.0, 50.0),
            end: Point2::new(410.0, 50.0),
            real_length_mm: 200.0,
        };
        match two.resolve(&TickParams::default()).expect("two point") {
            ResolvedCalibration::Ruler(r) => {
                assert!(r.is_fallback());
                assert_abs_diff_eq!(r.scale_px_per_mm, 2.0, epsilon = 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }

        let json = r#"{
            "kind": "external_planar_reference",
            "corners": [[0.0, 0.0], [200.0, 0.0], [200.0, 100.0], [0.0, 100.0]],
            "width_mm": 100.0,
            "height_mm": 50.0
        }"#;
        let planar: CalibrationPayload = serde_json::from_str(json).expect("planar");
        assert!(matches!(
            planar.resolve(&TickParams::default()),
            Ok(ResolvedCalibration::Planar(_))
        ));

        let collinear = CalibrationPayload::ExternalPlanarReference(PlanarReference::new(
            [
                Point2::new(0.0, 0.0),
                Point2::new(100.0, 0.0),
                Point2::new(200.0, 0.0),
                Point2::new(0.0, 100.0),
            ],
            100.0,
            50.0,
        ));
        assert!(matches!(
            collinear.resolve(&TickParams::default()),
            Err(MeasureError::DegenerateGeometry { .. })
        ));
    }
}
