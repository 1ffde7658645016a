//! Pixel diff engine.
//!
//! Compares two equal-sized RGBA buffers pixel by pixel using a perceptual
//! colour distance in YIQ space. Semi-transparent pixels are blended onto
//! white before comparison. A pixel differs when its squared YIQ distance
//! exceeds `MAX_YIQ_DELTA * tolerance^2`.
//!
//! The diff image draws differing pixels in `diff_color` and everything else
//! as a faded grayscale copy of the first image, so the number of
//! `diff_color` pixels equals the reported count.

use crate::normalize::normalize;
use crate::raster::{RasterImage, CHANNELS};
use crate::result::{PageDiffError, PageDiffResult};
use serde::{Deserialize, Serialize};

/// Maximum possible squared distance in YIQ space
pub const MAX_YIQ_DELTA: f64 = 35215.0;

/// Tolerance used for page comparisons (0-1 scale)
pub const DEFAULT_TOLERANCE: f64 = 0.1;

const Y_WEIGHT: f64 = 0.5053;
const I_WEIGHT: f64 = 0.299;
const Q_WEIGHT: f64 = 0.1957;

/// Configuration for the diff engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Per-pixel colour distance tolerance (0.0-1.0)
    pub tolerance: f64,
    /// Opacity of unchanged pixels in the diff image (0.0-1.0)
    pub alpha: f64,
    /// Colour used to mark differing pixels
    pub diff_color: [u8; 3],
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            alpha: 0.1,
            diff_color: [255, 0, 0],
        }
    }
}

impl DiffConfig {
    /// Set the tolerance
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the fade alpha for unchanged pixels
    #[must_use]
    pub const fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the marker colour
    #[must_use]
    pub const fn with_diff_color(mut self, color: [u8; 3]) -> Self {
        self.diff_color = color;
        self
    }

    /// Largest squared YIQ distance still considered equal
    #[must_use]
    pub fn max_delta(&self) -> f64 {
        MAX_YIQ_DELTA * self.tolerance * self.tolerance
    }

    /// Marker colour as an opaque RGBA pixel
    #[must_use]
    pub const fn marker(&self) -> [u8; 4] {
        let [r, g, b] = self.diff_color;
        [r, g, b, 255]
    }
}

/// Result of diffing two images
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Visualization of the differences
    pub image: RasterImage,
    /// Number of pixels that differ
    pub differing_pixels: u64,
    /// Total number of pixels compared
    pub total_pixels: u64,
    /// Percentage of pixels that differ (0.0-100.0)
    pub diff_percentage: f64,
}

impl DiffOutcome {
    /// Check if images are identical within tolerance
    #[must_use]
    pub const fn is_identical(&self) -> bool {
        self.differing_pixels == 0
    }

    /// Check if the differing share is at most `max_percentage`
    #[must_use]
    pub fn within(&self, max_percentage: f64) -> bool {
        self.diff_percentage <= max_percentage
    }
}

/// `count / total * 100`, zero for an empty canvas
#[must_use]
pub fn diff_percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Diff two images of identical dimensions.
///
/// # Errors
///
/// Returns [`PageDiffError::DimensionMismatch`] if the inputs were not
/// normalized first.
pub fn diff(a: &RasterImage, b: &RasterImage, config: &DiffConfig) -> PageDiffResult<DiffOutcome> {
    if a.dimensions() != b.dimensions() {
        return Err(PageDiffError::DimensionMismatch {
            expected: a.dimensions(),
            actual: b.dimensions(),
        });
    }

    let (width, height) = a.dimensions();
    let max_delta = config.max_delta();
    let marker = config.marker();
    let mut out = Vec::with_capacity(a.as_bytes().len());
    let mut differing_pixels = 0u64;

    for (pa, pb) in a
        .as_bytes()
        .chunks_exact(CHANNELS)
        .zip(b.as_bytes().chunks_exact(CHANNELS))
    {
        let pa = [pa[0], pa[1], pa[2], pa[3]];
        let pb = [pb[0], pb[1], pb[2], pb[3]];
        if pa != pb && color_delta(pa, pb) > max_delta {
            differing_pixels += 1;
            out.extend_from_slice(&marker);
        } else {
            out.extend_from_slice(&faded_gray(pa, config.alpha));
        }
    }

    let image = RasterImage::from_rgba(width, height, out)?;
    let total_pixels = a.pixel_count();
    Ok(DiffOutcome {
        image,
        differing_pixels,
        total_pixels,
        diff_percentage: diff_percentage(differing_pixels, total_pixels),
    })
}

/// Normalize two images onto a shared canvas, then diff them.
///
/// # Errors
///
/// Never fails with a dimension mismatch; propagates buffer errors only.
pub fn normalize_and_diff(
    a: &RasterImage,
    b: &RasterImage,
    config: &DiffConfig,
) -> PageDiffResult<DiffOutcome> {
    let (na, nb) = normalize(a, b);
    diff(&na, &nb, config)
}

/// Squared perceptual distance between two RGBA pixels in YIQ space
#[must_use]
pub fn color_delta(a: [u8; 4], b: [u8; 4]) -> f64 {
    let (r1, g1, b1) = blend_on_white(a);
    let (r2, g2, b2) = blend_on_white(b);

    let y = rgb_to_y(r1, g1, b1) - rgb_to_y(r2, g2, b2);
    let i = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let q = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);

    Y_WEIGHT * y * y + I_WEIGHT * i * i + Q_WEIGHT * q * q
}

fn blend_on_white(px: [u8; 4]) -> (f64, f64, f64) {
    let [r, g, b, a] = px;
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    match a {
        255 => (r, g, b),
        0 => (255.0, 255.0, 255.0),
        _ => {
            let alpha = f64::from(a) / 255.0;
            (
                255.0 + (r - 255.0) * alpha,
                255.0 + (g - 255.0) * alpha,
                255.0 + (b - 255.0) * alpha,
            )
        }
    }
}

fn rgb_to_y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb_to_i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb_to_q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn faded_gray(px: [u8; 4], alpha: f64) -> [u8; 4] {
    let [r, g, b, a] = px;
    let luma = rgb_to_y(f64::from(r), f64::from(g), f64::from(b));
    let v = (255.0 + (luma - 255.0) * alpha * f64::from(a) / 255.0).clamp(0.0, 255.0) as u8;
    [v, v, v, 255]
}
