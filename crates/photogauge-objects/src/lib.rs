//! Object detection and height categorization for photogauge.
//!
//! Contours come from an external extractor. This crate filters them,
//! fits oriented boxes, measures heights above the base line with the active
//! scale and sorts the survivors into three height bins.

mod category;
mod contour;
mod detector;
mod scale;

pub use category::{category_of, Category, CategoryThresholds};
pub use contour::{convex_hull, min_area_rect, Contour, OrientedBox};
pub use detector::{
    assign_ids, detect_objects, objects_from_observations, DetectedObject, ObjectDetectionParams,
    ObjectObservation, ObjectState,
};
pub use scale::MeasurementScale;
