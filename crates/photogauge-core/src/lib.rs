//! Core types and utilities for photogrammetric height measurement.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! perform edge, line or contour detection; those primitives are supplied by
//! the caller and arrive here as plain segments, point lists and intensity
//! samples.

mod error;
mod geometry;
mod homography;
mod image;
mod logger;
mod perspective;
pub mod signal;

pub use error::MeasureError;
pub use geometry::{Axis, LineSegment, Orientation, Region};
pub use homography::{
    homography_from_4pt, order_quad, Homography, PlanarCalibration, PlanarReference,
};
pub use image::{sample_bilinear, GrayImageView, GrayStripSampler, ProfileSampler};
pub use perspective::PerspectiveCorrection;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

pub use nalgebra::{Point2, Vector2};
