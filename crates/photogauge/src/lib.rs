//! High-level facade for the `photogauge-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry, ruler and object crates
//! - [`CalibrationSession`], the mutable calibration and measurement state
//! - ingestion of externally computed analyses ([`ExternalAnalysis`])
//! - JSON configuration, scene and report I/O
//! - an image pipeline over injected [`VisionPrimitives`]
//!
//! ## Quickstart
//!
//! ```
//! use photogauge::core::{Axis, Point2};
//! use photogauge::objects::Contour;
//! use photogauge::ruler::{BaseLine, Ruler, TickObservation};
//! use photogauge::{CalibrationSession, DetectionStatus, MeasureConfig};
//!
//! # fn main() -> Result<(), photogauge::core::MeasureError> {
//! let ticks: Vec<TickObservation> = [(100.0, 0.0), (150.0, 100.0), (200.0, 200.0), (250.0, 300.0)]
//!     .iter()
//!     .map(|&(pixel, value_mm)| TickObservation { pixel, value_mm })
//!     .collect();
//!
//! let mut session = CalibrationSession::new(&MeasureConfig::default());
//! session.set_ruler(Ruler::from_observations(None, Axis::Y, &ticks, 4)?)?;
//! session.set_base_line(BaseLine::new(500.0))?;
//!
//! let column = Contour::new(vec![
//!     Point2::new(300.0, 300.0),
//!     Point2::new(340.0, 300.0),
//!     Point2::new(340.0, 500.0),
//!     Point2::new(300.0, 500.0),
//! ]);
//! let summary = session.run_detection(&[column])?;
//! assert_eq!(summary.status, DetectionStatus::Found(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `photogauge::core`: geometry, signal utilities, homographies, errors.
//! - `photogauge::ruler`: tick calibration and ruler / base-line selection.
//! - `photogauge::objects`: contour geometry, detection and categorization.

pub use photogauge_core as core;
pub use photogauge_objects as objects;
pub use photogauge_ruler as ruler;

mod io;
mod payload;
mod pipeline;
mod session;

pub use io::{ConfigError, MeasureConfig, MeasurementReport, ObjectReport, RulerReport, Scene};
pub use payload::{CalibrationPayload, ExternalAnalysis, ResolvedCalibration};
pub use pipeline::{measure_scene, ImagePipeline, PrecomputedPrimitives, VisionPrimitives};
pub use session::{
    CalibrationSession, DetectionPass, DetectionSnapshot, DetectionStatus, DetectionSummary,
};

#[cfg(feature = "image")]
pub use pipeline::{gray_view, load_gray};

pub use photogauge_core::MeasureError;
