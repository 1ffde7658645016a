//! In-memory RGBA raster buffer.
//!
//! Row-major, origin top-left, four interleaved 8-bit samples per pixel.
//! Decoding accepts anything the `image` crate understands; encoding is
//! always PNG.

use crate::result::{PageDiffError, PageDiffResult};
use image::{ImageEncoder, RgbaImage};

/// Bytes per RGBA pixel
pub const CHANNELS: usize = 4;

/// Opaque white, the neutral canvas colour
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// A decoded raster image
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RasterImage {
    /// Create an image with every pixel set to `pixel`
    #[must_use]
    pub fn new_filled(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            data.extend_from_slice(&pixel);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Create an opaque white image
    #[must_use]
    pub fn white(width: u32, height: u32) -> Self {
        Self::new_filled(width, height, WHITE)
    }

    /// Wrap an existing RGBA buffer
    ///
    /// # Errors
    ///
    /// Returns error if the buffer length is not `width * height * 4`
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> PageDiffResult<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(PageDiffError::image_io(format!(
                "RGBA buffer for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode encoded image bytes (PNG, JPEG) into RGBA
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are empty or not a decodable image
    pub fn decode(bytes: &[u8]) -> PageDiffResult<Self> {
        if bytes.is_empty() {
            return Err(PageDiffError::image_io("image data is empty"));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PageDiffError::image_io(format!("Failed to decode image: {e}")))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            data: decoded.into_raw(),
        })
    }

    /// Encode as PNG
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn encode_png(&self) -> PageDiffResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
        encoder
            .write_image(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| PageDiffError::image_io(format!("Failed to encode PNG: {e}")))?;
        Ok(buffer)
    }

    /// Width in pixels
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total number of pixels
    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Raw RGBA samples
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * CHANNELS)
    }

    /// Pixel at `(x, y)`, or `None` outside the image
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let i = self.offset(x, y)?;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Overwrite the pixel at `(x, y)`. Returns `false` outside the image.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: [u8; 4]) -> bool {
        match self.offset(x, y) {
            Some(i) => {
                self.data[i..i + CHANNELS].copy_from_slice(&pixel);
                true
            }
            None => false,
        }
    }

    /// One row of RGBA samples
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        Some(&self.data[start..start + stride])
    }

    /// Copy `src` unscaled into this image with its top-left corner at the
    /// origin. Source pixels falling outside this image are dropped.
    pub fn blit_top_left(&mut self, src: &Self) {
        let rows = src.height.min(self.height);
        let cols = src.width.min(self.width) as usize * CHANNELS;
        let dst_stride = self.width as usize * CHANNELS;
        for y in 0..rows {
            if let Some(src_row) = src.row(y) {
                let start = y as usize * dst_stride;
                self.data[start..start + cols].copy_from_slice(&src_row[..cols]);
            }
        }
    }

    /// Whether the `region.0 x region.1` top-left region of `self` equals `other`'s
    #[must_use]
    pub fn region_equals(&self, other: &Self, region: (u32, u32)) -> bool {
        let (w, h) = region;
        if w > self.width || w > other.width || h > self.height || h > other.height {
            return false;
        }
        let cols = w as usize * CHANNELS;
        (0..h).all(|y| match (self.row(y), other.row(y)) {
            (Some(a), Some(b)) => a[..cols] == b[..cols],
            _ => false,
        })
    }
}

impl From<RgbaImage> for RasterImage {
    fn from(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}
