//! Image-level measurement over injected vision primitives.
//!
//! Edge, line and contour extraction are not implemented here. They are
//! supplied by a [`VisionPrimitives`] value that the caller has already
//! initialized, so a pipeline cannot exist before its primitives are ready.

use crate::io::MeasureConfig;
use crate::session::{CalibrationSession, DetectionSummary};
use log::debug;
use photogauge_core::{
    GrayImageView, GrayStripSampler, LineSegment, MeasureError, Orientation, ProfileSampler, Region,
};
use photogauge_objects::Contour;
use photogauge_ruler::{detect_base_line, detect_ruler, LineClassifierParams};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Line-segment and contour extraction provided by a vision library.
pub trait VisionPrimitives {
    /// Probabilistic line segments of the image.
    fn line_segments(&self, image: &GrayImageView<'_>) -> Vec<LineSegment>;
    /// Closed object contours of the image.
    fn contours(&self, image: &GrayImageView<'_>) -> Vec<Contour>;
}

/// Primitives that were extracted ahead of time, e.g. loaded from a scene file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrecomputedPrimitives {
    pub lines: Vec<LineSegment>,
    pub contours: Vec<Contour>,
}

impl VisionPrimitives for PrecomputedPrimitives {
    fn line_segments(&self, _image: &GrayImageView<'_>) -> Vec<LineSegment> {
        self.lines.clone()
    }

    fn contours(&self, _image: &GrayImageView<'_>) -> Vec<Contour> {
        self.contours.clone()
    }
}

/// Calibrate missing rulers and the base line from `lines`, then run a
/// detection pass over `contours`.
///
/// Rulers and a base line already present in the session are kept. A
/// fallback ruler of assumed length is not installed over a planar reference.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(lines = lines.len(), contours = contours.len()))
)]
pub fn measure_scene(
    session: &mut CalibrationSession,
    lines: &[LineSegment],
    contours: &[Contour],
    sampler: &(impl ProfileSampler + ?Sized),
    base_region: Option<Region>,
    params: &LineClassifierParams,
) -> Result<DetectionSummary, MeasureError> {
    for orientation in [Orientation::Vertical, Orientation::Horizontal] {
        if session.ruler(orientation.axis()).is_some() {
            continue;
        }
        match detect_ruler(lines, orientation, sampler, params) {
            Ok(ruler) if ruler.is_fallback() && session.planar().is_some() => {
                debug!("{orientation:?} fallback ruler skipped: planar reference present");
            }
            Ok(ruler) => session.set_ruler(ruler)?,
            Err(err) => debug!("{err}"),
        }
    }

    if session.base_line().is_none() {
        if let Some(base) = base_region.and_then(|r| detect_base_line(lines, &r, params)) {
            session.set_base_line(base)?;
        }
    }

    session.run_detection(contours)
}

pub struct ImagePipeline<P> {
    primitives: P,
    config: MeasureConfig,
}

impl<P: VisionPrimitives> ImagePipeline<P> {
    pub fn new(primitives: P, config: MeasureConfig) -> Self {
        Self { primitives, config }
    }

    pub fn primitives(&self) -> &P {
        &self.primitives
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    /// Base-line search region for an image of this size.
    pub fn base_region(&self, image: &GrayImageView<'_>) -> Region {
        self.config.base_region.unwrap_or_else(|| {
            let (w, h) = (image.width as f64, image.height as f64);
            Region::new(0.0, 0.5 * h, w, h)
        })
    }

    /// Full pass on one image.
    pub fn measure(
        &self,
        session: &mut CalibrationSession,
        image: &GrayImageView<'_>,
    ) -> Result<DetectionSummary, MeasureError> {
        let lines = self.primitives.line_segments(image);
        let contours = self.primitives.contours(image);
        let sampler = GrayStripSampler::new(*image, self.config.strip_half_width);
        measure_scene(
            session,
            &lines,
            &contours,
            &sampler,
            Some(self.base_region(image)),
            &self.config.lines,
        )
    }
}

/// Convert an `image::GrayImage` into the lightweight core view type.
#[cfg(feature = "image")]
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Decode an image file and convert it to 8-bit grayscale.
#[cfg(feature = "image")]
pub fn load_gray(path: impl AsRef<std::path::Path>) -> Result<::image::GrayImage, ::image::ImageError> {
    Ok(::image::ImageReader::open(path)?.decode()?.to_luma8())
}
