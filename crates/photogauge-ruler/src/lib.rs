//! Ruler calibration for photogauge.
//!
//! - tick extraction from a perpendicular-strip intensity profile,
//! - px-per-mm scale estimation with spacing-based outlier rejection,
//! - orientation classification of external line segments, ruler candidate
//!   ranking and base-line selection.
//!
//! Segment detection itself is external; this crate only consumes segments.

mod lines;
mod ruler;
mod ticks;

pub use lines::{
    classify_segment, detect_base_line, detect_ruler, detect_rulers, rank_candidates, BaseLine,
    DetectedRulers, LineClassifierParams,
};
pub use ruler::{Ruler, RulerSource, ScaleMode, Tick, TickObservation};
pub use ticks::{
    calibrate_segment, extract_ticks, filter_ticks_by_spacing, sample_profile, TickExtraction,
    TickParams,
};
