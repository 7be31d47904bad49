// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + optional oxipng pass) and
// the lossless intermediate format (QOI) used between stages.

use crate::engine::common::run_with_panic_policy;
use crate::error::{MockupError, Result};
use crate::ops::{BufferFormat, OutputFormat};
use image::{DynamicImage, ImageFormat, RgbImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

use crate::engine::MAX_DIMENSION;

/// Knobs for a single encode call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    /// JPEG quality (0-100). Ignored by the lossless formats.
    pub quality: u8,
    /// Run oxipng over PNG output. Only worth it for the final mockup.
    pub optimize: bool,
}

impl EncodeOptions {
    /// Options for buffers that only live until the next stage decodes them.
    pub const STAGE: EncodeOptions = EncodeOptions {
        quality: 90,
        optimize: false,
    };

    /// Options and buffer format for the final, user-facing mockup.
    pub fn for_output(format: OutputFormat) -> (BufferFormat, Self) {
        match format {
            OutputFormat::Jpeg { quality } => (
                BufferFormat::Jpeg,
                Self {
                    quality,
                    optimize: false,
                },
            ),
            OutputFormat::Png => (
                BufferFormat::Png,
                Self {
                    quality: 100,
                    optimize: true,
                },
            ),
        }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::STAGE
    }
}

/// Encode `img` as `format`.
pub fn encode(img: &DynamicImage, format: BufferFormat, options: EncodeOptions) -> Result<Vec<u8>> {
    match format {
        BufferFormat::Jpeg => encode_jpeg(img, options.quality),
        BufferFormat::Png => encode_png(img, options.optimize),
        BufferFormat::Intermediate => encode_intermediate(img),
    }
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.min(100);

        // JPEG has no alpha; transparency is dropped, not flattened.
        let rgb: Cow<'_, RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(MockupError::encode_failed(
                "jpeg",
                "Invalid image dimensions: width or height is zero",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(MockupError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);

        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let smoothing = if quality >= 90 {
            0
        } else if quality >= 70 {
            5
        } else {
            10
        };
        comp.set_smoothing_factor(smoothing);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                MockupError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    MockupError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                MockupError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

pub fn encode_png(img: &DynamicImage, optimize: bool) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| MockupError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        if !optimize {
            return Ok(buf);
        }

        // Lossless recompression; keep every chunk.
        let mut options = oxipng::Options::from_preset(4);
        options.strip = oxipng::StripChunks::None;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            MockupError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Lossless, fast QOI encode for buffers that are decoded again by a later step.
pub fn encode_intermediate(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:intermediate", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Qoi)
            .map_err(|e| {
                MockupError::encode_failed("intermediate", format!("QOI encode failed: {e}"))
            })?;
        Ok(buf)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::{decode_rgba, detect_format};
    use image::RgbaImage;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90, (x % 256) as u8])
        }))
    }

    #[test]
    fn test_intermediate_is_lossless() {
        let img = gradient(33, 17);
        let bytes = encode_intermediate(&img).unwrap();
        assert_eq!(detect_format(&bytes), Some(ImageFormat::Qoi));
        assert_eq!(decode_rgba(&bytes).unwrap(), img.to_rgba8());
    }

    #[test]
    fn test_png_keeps_alpha_with_and_without_optimization() {
        let img = gradient(20, 20);
        let plain = encode_png(&img, false).unwrap();
        let optimized = encode_png(&img, true).unwrap();
        assert_eq!(decode_rgba(&plain).unwrap(), img.to_rgba8());
        assert_eq!(decode_rgba(&optimized).unwrap(), img.to_rgba8());
    }

    #[test]
    fn test_jpeg_output_is_jpeg() {
        let bytes = encode_jpeg(&gradient(16, 16), 80).unwrap();
        assert_eq!(detect_format(&bytes), Some(ImageFormat::Jpeg));
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_jpeg_rejects_empty_image() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            encode_jpeg(&empty, 90),
            Err(MockupError::EncodeFailed { .. })
        ));
    }

    #[test]
    fn test_output_options() {
        let (format, options) = EncodeOptions::for_output(OutputFormat::Jpeg { quality: 72 });
        assert_eq!(format, BufferFormat::Jpeg);
        assert_eq!(options.quality, 72);
        let (format, options) = EncodeOptions::for_output(OutputFormat::Png);
        assert_eq!(format, BufferFormat::Png);
        assert!(options.optimize);
    }
}
