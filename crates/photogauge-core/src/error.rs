/// Errors shared by the measurement crates.
///
/// An empty object list is a valid outcome and is never reported here.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    /// Not enough line, tick or contour evidence. Recoverable by falling back
    /// to a weaker heuristic or asking for manual input.
    #[error("{stage}: detection failed; {hint}")]
    DetectionFailure { stage: &'static str, hint: String },

    /// Near-singular homography or regression input.
    #[error("degenerate geometry ({what}); {hint}")]
    DegenerateGeometry { what: &'static str, hint: String },

    /// An operation ran before its required calibration existed.
    #[error("calibration missing: {what}")]
    CalibrationMissing { what: &'static str },

    #[error("invalid category thresholds: short max {short_max_mm} mm must be below medium max {medium_max_mm} mm")]
    InvalidThresholds {
        short_max_mm: f64,
        medium_max_mm: f64,
    },
}

impl MeasureError {
    pub fn detection(stage: &'static str, hint: impl Into<String>) -> Self {
        Self::DetectionFailure {
            stage,
            hint: hint.into(),
        }
    }

    pub fn degenerate(what: &'static str, hint: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            what,
            hint: hint.into(),
        }
    }

    /// True for failures the caller can recover from with new input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DetectionFailure { .. } | Self::DegenerateGeometry { .. }
        )
    }
}
