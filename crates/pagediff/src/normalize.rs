//! Canvas normalization.
//!
//! Full-page captures grow and shrink with page content, so two images are
//! compared on a common canvas: the pairwise maximum of their dimensions,
//! filled with opaque white, each source pasted unscaled at the top-left.
//! Nothing is cropped, stretched, or interpolated.

use crate::raster::RasterImage;

/// Pad `a` and `b` onto white canvases of identical, pairwise-maximal size.
///
/// Always produces fresh buffers, even when the inputs already match.
#[must_use]
pub fn normalize(a: &RasterImage, b: &RasterImage) -> (RasterImage, RasterImage) {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    (pad_to(a, width, height), pad_to(b, width, height))
}

fn pad_to(src: &RasterImage, width: u32, height: u32) -> RasterImage {
    let mut canvas = RasterImage::white(width, height);
    canvas.blit_top_left(src);
    canvas
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::raster::WHITE;
    use proptest::prelude::*;

    const INK: [u8; 4] = [12, 34, 56, 255];

    #[test]
    fn test_equal_dimensions_is_copy() {
        let a = RasterImage::new_filled(4, 4, INK);
        let b = RasterImage::white(4, 4);
        let (na, nb) = normalize(&a, &b);
        assert_eq!(na, a);
        assert_eq!(nb, b);
    }

    #[test]
    fn test_taller_capture_pads_baseline_with_white() {
        let baseline = RasterImage::new_filled(1280, 800, INK);
        let current = RasterImage::new_filled(1280, 950, INK);
        let (nb, nc) = normalize(&baseline, &current);
        assert_eq!(nb.dimensions(), (1280, 950));
        assert_eq!(nc.dimensions(), (1280, 950));
        assert_eq!(nb.pixel(0, 799), Some(INK));
        assert_eq!(nb.pixel(0, 800), Some(WHITE));
        assert_eq!(nb.pixel(1279, 949), Some(WHITE));
        assert_eq!(nc.pixel(1279, 949), Some(INK));
    }

    #[test]
    fn test_crossed_dimensions() {
        let wide = RasterImage::new_filled(6, 2, INK);
        let tall = RasterImage::new_filled(2, 5, INK);
        let (nw, nt) = normalize(&wide, &tall);
        assert_eq!(nw.dimensions(), (6, 5));
        assert_eq!(nt.dimensions(), (6, 5));
        assert_eq!(nw.pixel(5, 4), Some(WHITE));
        assert_eq!(nt.pixel(5, 0), Some(WHITE));
        assert_eq!(nt.pixel(1, 4), Some(INK));
    }

    #[test]
    fn test_transparent_source_pixels_are_kept() {
        let a = RasterImage::new_filled(1, 1, [0, 0, 0, 0]);
        let b = RasterImage::white(2, 2);
        let (na, _) = normalize(&a, &b);
        assert_eq!(na.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(na.pixel(1, 1), Some(WHITE));
    }

    fn arb_image() -> impl Strategy<Value = RasterImage> {
        (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
            proptest::collection::vec(any::<u8>(), (w * h * 4) as usize)
                .prop_map(move |data| RasterImage::from_rgba(w, h, data).unwrap())
        })
    }

    proptest! {
        #[test]
        fn prop_normalize_is_pairwise_max(a in arb_image(), b in arb_image()) {
            let (na, nb) = normalize(&a, &b);
            let expected = (a.width().max(b.width()), a.height().max(b.height()));
            prop_assert_eq!(na.dimensions(), expected);
            prop_assert_eq!(nb.dimensions(), expected);
            prop_assert!(na.region_equals(&a, a.dimensions()));
            prop_assert!(nb.region_equals(&b, b.dimensions()));

            for y in 0..expected.1 {
                for x in 0..expected.0 {
                    if x >= a.width() || y >= a.height() {
                        prop_assert_eq!(na.pixel(x, y), Some(WHITE));
                    } else {
                        prop_assert_eq!(na.pixel(x, y), a.pixel(x, y));
                    }
                    if x >= b.width() || y >= b.height() {
                        prop_assert_eq!(nb.pixel(x, y), Some(WHITE));
                    } else {
                        prop_assert_eq!(nb.pixel(x, y), b.pixel(x, y));
                    }
                }
            }
        }
    }
}
