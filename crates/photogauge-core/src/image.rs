use crate::Orientation;
use nalgebra::Point2;

/// Borrowed row-major 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl GrayImageView<'_> {
    #[inline]
    fn get(&self, x: i64, y: i64) -> Option<f64> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        self.data
            .get(y as usize * self.width + x as usize)
            .map(|&v| v as f64)
    }

    /// True when `(x, y)` lies inside the pixel grid.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width as f64 - 1.0) && y <= (self.height as f64 - 1.0)
    }
}

/// Bilinear sample; `None` outside the image.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> Option<f64> {
    if !src.contains(x, y) {
        return None;
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get(x0, y0)?;
    // Right/bottom neighbours are clamped at the last row/column.
    let p10 = src.get(x0 + 1, y0).unwrap_or(p00);
    let p01 = src.get(x0, y0 + 1).unwrap_or(p00);
    let p11 = src.get(x0 + 1, y0 + 1).unwrap_or(p10);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    Some(a + fy * (b - a))
}

/// Source of the mean intensity of a short strip perpendicular to a ruler.
///
/// `orientation` is the orientation of the ruler being profiled; the strip
/// runs across it. Intensities are on the 0..255 scale.
pub trait ProfileSampler {
    fn strip_mean(&self, center: Point2<f64>, orientation: Orientation) -> Option<f64>;
}

impl<F> ProfileSampler for F
where
    F: Fn(Point2<f64>, Orientation) -> Option<f64>,
{
    fn strip_mean(&self, center: Point2<f64>, orientation: Orientation) -> Option<f64> {
        self(center, orientation)
    }
}

/// [`ProfileSampler`] over a grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayStripSampler<'a> {
    pub image: GrayImageView<'a>,
    /// Strip half-width in pixels across the ruler.
    pub half_width: usize,
}

impl<'a> GrayStripSampler<'a> {
    pub fn new(image: GrayImageView<'a>, half_width: usize) -> Self {
        Self { image, half_width }
    }
}

impl ProfileSampler for GrayStripSampler<'_> {
    fn strip_mean(&self, center: Point2<f64>, orientation: Orientation) -> Option<f64> {
        let hw = self.half_width as i64;
        let mut acc = 0.0;
        let mut count = 0usize;
        for k in -hw..=hw {
            let off = k as f64;
            let (x, y) = match orientation {
                Orientation::Horizontal => (center.x, center.y + off),
                Orientation::Vertical => (center.x + off, center.y),
            };
            if let Some(v) = sample_bilinear(&self.image, x, y) {
                acc += v;
                count += 1;
            }
        }
        (count > 0).then(|| acc / count as f64)
    }
}
