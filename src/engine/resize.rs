// src/engine/resize.rs
//
// Artwork resizing: fast_image_resize (Lanczos3, alpha premultiplied) with
// the image crate as fallback, plus the fit-inside dimension math.

use crate::engine::decoder::check_dimensions;
use crate::error::{MockupError, Result};
use crate::ops::ResizeFit;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, RgbaImage};
use tracing::debug;

/// Target size for `src` resized into a `box_w x box_h` box.
///
/// `Inside` keeps the aspect ratio and touches the box on the tighter axis;
/// `Fill` returns the box itself. Never returns a zero dimension.
pub fn calc_resize_dimensions(
    src_w: u32,
    src_h: u32,
    box_w: u32,
    box_h: u32,
    fit: ResizeFit,
) -> (u32, u32) {
    match fit {
        ResizeFit::Fill => (box_w, box_h),
        ResizeFit::Inside => {
            if src_w == 0 || src_h == 0 {
                return (box_w, box_h);
            }
            let src_ratio = src_w as f64 / src_h as f64;
            let box_ratio = box_w as f64 / box_h as f64;
            if src_ratio > box_ratio {
                // Wider than the box -> fit to width
                let ratio = box_w as f64 / src_w as f64;
                (box_w, ((src_h as f64 * ratio).round() as u32).max(1))
            } else {
                // Taller than the box -> fit to height
                let ratio = box_h as f64 / src_h as f64;
                (((src_w as f64 * ratio).round() as u32).max(1), box_h)
            }
        }
    }
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Resize straight-alpha RGBA pixels to exactly `dst_width x dst_height`.
pub fn resize_rgba(img: RgbaImage, dst_width: u32, dst_height: u32) -> Result<RgbaImage> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(MockupError::invalid_resize_dimensions(dst_width, dst_height));
    }
    check_dimensions(dst_width, dst_height)?;
    if (src_width, src_height) == (dst_width, dst_height) {
        return Ok(img);
    }

    let mut src_pixels = img.into_raw();
    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        PixelType::U8x4,
    ) {
        Ok(src_image) => resize_with_source_image(src_image, dst_width, dst_height),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            copy_pixels_to_aligned_image(src_width, src_height, &src_pixels)
                .and_then(|aligned| resize_with_source_image(aligned, dst_width, dst_height))
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    let resized = match primary {
        Ok(pixels) => pixels,
        Err(err) => {
            debug!(target: "mockup_engine::resize", %err, "fast_image_resize failed, using image crate");
            resize_with_image_crate_fallback(src_pixels, src_width, src_height, dst_width, dst_height)
                .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
                .map_err(|msg| {
                    MockupError::resize_failed((src_width, src_height), (dst_width, dst_height), msg)
                })?
        }
    };
    Ok(resized)
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    src_pixels: &[u8],
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned = fir::images::Image::new(width, height, PixelType::U8x4);
    let buffer = aligned.buffer_mut();
    if buffer.len() != src_pixels.len() {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {} bytes, got {} bytes",
            src_pixels.len(),
            buffer.len()
        ));
    }
    buffer.copy_from_slice(src_pixels);
    Ok(aligned)
}

fn resize_with_image_crate_fallback(
    src_pixels: Vec<u8>,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, String> {
    let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels)
        .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
    Ok(image::imageops::resize(
        &rgba,
        dst_width,
        dst_height,
        FilterType::Lanczos3,
    ))
}

fn is_fully_opaque(image: &fir::images::Image) -> bool {
    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x4);

    // Opaque artwork (the usual case) skips the premultiply round trip.
    let needs_premultiply = !is_fully_opaque(&src_image);

    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &default_resize_options())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    RgbaImage::from_raw(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| "fir produced a buffer of unexpected size".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_inside_wide_source() {
        assert_eq!(
            calc_resize_dimensions(1000, 500, 502, 855, ResizeFit::Inside),
            (502, 251)
        );
    }

    #[test]
    fn test_calc_inside_tall_source() {
        // 0.6 is still wider than the 502:855 box, so width is the tight axis.
        assert_eq!(
            calc_resize_dimensions(300, 500, 502, 855, ResizeFit::Inside),
            (502, 837)
        );
        assert_eq!(
            calc_resize_dimensions(100, 400, 502, 855, ResizeFit::Inside),
            (214, 855)
        );
    }

    #[test]
    fn test_calc_fill_ignores_aspect() {
        assert_eq!(
            calc_resize_dimensions(300, 500, 502, 855, ResizeFit::Fill),
            (502, 855)
        );
    }

    #[test]
    fn test_calc_never_returns_zero() {
        let (w, h) = calc_resize_dimensions(10_000, 1, 502, 855, ResizeFit::Inside);
        assert_eq!(w, 502);
        assert_eq!(h, 1);
    }

    #[test]
    fn test_resize_solid_color_stays_solid() {
        let img = RgbaImage::from_pixel(30, 50, image::Rgba([200, 0, 0, 255]));
        let out = resize_rgba(img, 60, 100).unwrap();
        assert_eq!(out.dimensions(), (60, 100));
        assert_eq!(out.get_pixel(30, 50).0, [200, 0, 0, 255]);
    }

    #[test]
    fn test_resize_transparent_edges_do_not_bleed_black() {
        let mut img = RgbaImage::from_pixel(20, 20, image::Rgba([0, 0, 0, 0]));
        for y in 0..20 {
            for x in 10..20 {
                img.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
            }
        }
        let out = resize_rgba(img, 10, 10).unwrap();
        let px = out.get_pixel(5, 5).0;
        // Partially covered pixel keeps a white color after unpremultiply.
        assert!(px[3] > 0);
        assert!(px[0] > 200, "{px:?}");
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let img = RgbaImage::from_fn(8, 8, |x, y| image::Rgba([x as u8, y as u8, 1, 255]));
        let out = resize_rgba(img.clone(), 8, 8).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_resize_zero_target_rejected() {
        let img = RgbaImage::new(4, 4);
        assert!(matches!(
            resize_rgba(img, 0, 4),
            Err(MockupError::InvalidResizeDimensions { .. })
        ));
    }
}
