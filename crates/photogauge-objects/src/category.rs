use photogauge_core::MeasureError;
use serde::{Deserialize, Serialize};

/// Height bin of a measured object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Below `short_max_mm`.
    A,
    /// In `[short_max_mm, medium_max_mm)`.
    B,
    /// At or above `medium_max_mm`.
    C,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::A => "A",
            Category::B => "B",
            Category::C => "C",
        };
        f.write_str(s)
    }
}

/// Upper bounds of the two lower bins; `short_max_mm < medium_max_mm`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct CategoryThresholds {
    short_max_mm: f64,
    medium_max_mm: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            short_max_mm: 200.0,
            medium_max_mm: 300.0,
        }
    }
}

#[derive(Deserialize)]
struct RawThresholds {
    short_max_mm: f64,
    medium_max_mm: f64,
}

impl TryFrom<RawThresholds> for CategoryThresholds {
    type Error = MeasureError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        Self::new(raw.short_max_mm, raw.medium_max_mm)
    }
}

impl CategoryThresholds {
    pub fn new(short_max_mm: f64, medium_max_mm: f64) -> Result<Self, MeasureError> {
        if !(short_max_mm.is_finite() && medium_max_mm.is_finite())
            || short_max_mm >= medium_max_mm
        {
            return Err(MeasureError::InvalidThresholds {
                short_max_mm,
                medium_max_mm,
            });
        }
        Ok(Self {
            short_max_mm,
            medium_max_mm,
        })
    }

    pub fn short_max_mm(&self) -> f64 {
        self.short_max_mm
    }

    pub fn medium_max_mm(&self) -> f64 {
        self.medium_max_mm
    }
}

/// Half-open binning: a height exactly at a threshold falls in the upper bin.
pub fn category_of(height_mm: f64, thresholds: &CategoryThresholds) -> Category {
    if height_mm < thresholds.short_max_mm {
        Category::A
    } else if height_mm < thresholds.medium_max_mm {
        Category::B
    } else {
        Category::C
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_fall_into_the_upper_bin() {
        let t = CategoryThresholds::new(200.0, 300.0).expect("valid");
        assert_eq!(category_of(199.0, &t), Category::A);
        assert_eq!(category_of(200.0, &t), Category::B);
        assert_eq!(category_of(299.9, &t), Category::B);
        assert_eq!(category_of(300.0, &t), Category::C);
        assert_eq!(category_of(301.0, &t), Category::C);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(CategoryThresholds::new(300.0, 200.0).is_err());
        assert!(CategoryThresholds::new(200.0, 200.0).is_err());
        assert!(CategoryThresholds::new(f64::NAN, 200.0).is_err());
    }

    #[test]
    fn thresholds_deserialize_from_json() {
        let t: CategoryThresholds =
            serde_json::from_str(r#"{"short_max_mm": 150.0, "medium_max_mm": 250.0}"#)
                .expect("json");
        assert_eq!(t.short_max_mm(), 150.0);
        assert_eq!(category_of(250.0, &t), Category::C);

        let swapped = serde_json::from_str::<CategoryThresholds>(
            r#"{"short_max_mm": 250.0, "medium_max_mm": 150.0}"#,
        );
        assert!(swapped.is_err());
    }
}
