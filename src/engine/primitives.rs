// src/engine/primitives.rs
//
// The imaging primitives every pipeline stage is written against, and the
// raster implementation built on image / fast_image_resize / rayon.
//
// Images are passed by value through transforms: each primitive consumes its
// input and returns the next state, so a stage reads as a chain of `?`s.

use crate::config::Percent;
use crate::engine::blend::{self, Layer};
use crate::engine::buffer::{Dimensions, ImageBuffer};
use crate::engine::decoder::{check_dimensions, decode_rgba, read_dimensions};
use crate::engine::distort;
use crate::engine::encoder::{self, EncodeOptions};
use crate::engine::resize::{calc_resize_dimensions, resize_rgba};
use crate::engine::sample::SampleEdge;
use crate::engine::{blur, common};
use crate::error::{MockupError, Result};
use crate::ops::{
    AlphaMode, Anchor, BufferFormat, Channel, Color, Colorspace, CompositeArgs, CompositeOperator,
    DistortMethod, EvaluateOp, OperatorRequirement, ResizeFit, VirtualPixel,
};
use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;
use tracing::instrument;

/// Decoded pixels plus the per-image settings the primitives consult.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelImage {
    pixels: RgbaImage,
    background: Color,
    virtual_pixel: VirtualPixel,
    alpha_enabled: bool,
    colorspace: Colorspace,
}

impl PixelImage {
    /// Wrap straight-alpha RGBA pixels with default settings: transparent
    /// background, edge virtual pixels, alpha on, sRGB.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            background: Color::TRANSPARENT,
            virtual_pixel: VirtualPixel::Edge,
            alpha_enabled: true,
            colorspace: Colorspace::Srgb,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn virtual_pixel(&self) -> VirtualPixel {
        self.virtual_pixel
    }

    pub fn alpha_enabled(&self) -> bool {
        self.alpha_enabled
    }

    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    /// Pixel at `(x, y)` as the primitives see it: alpha reads as opaque
    /// while the alpha channel is off.
    pub fn effective_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let mut px = self.pixels.get_pixel(x, y).0;
        if !self.alpha_enabled {
            px[3] = 255;
        }
        px
    }

    fn layer(&self) -> Layer<'_> {
        Layer {
            pixels: &self.pixels,
            alpha_enabled: self.alpha_enabled,
        }
    }

    fn sample_edge(&self) -> SampleEdge {
        SampleEdge::from_virtual_pixel(self.virtual_pixel, self.background)
    }

    fn with_pixels(self, pixels: RgbaImage) -> Self {
        Self { pixels, ..self }
    }

    fn to_dynamic(&self) -> DynamicImage {
        if self.alpha_enabled {
            DynamicImage::ImageRgba8(self.pixels.clone())
        } else {
            DynamicImage::ImageRgba8(self.pixels.clone()).to_rgb8().into()
        }
    }
}

/// Pixel operations the pipeline stages are written against.
///
/// Transforms consume their input image and return the result. The pipeline
/// takes an implementation by injection; tests wrap one to count calls.
pub trait ImagingPrimitives: Send + Sync {
    fn decode(&self, buffer: &ImageBuffer) -> Result<PixelImage>;

    fn encode(
        &self,
        image: &PixelImage,
        format: BufferFormat,
        options: EncodeOptions,
    ) -> Result<ImageBuffer>;

    /// Header-only dimension probe of encoded bytes.
    fn dimensions(&self, bytes: &[u8]) -> Result<Dimensions>;

    fn resize(&self, image: PixelImage, width: u32, height: u32, fit: ResizeFit)
        -> Result<PixelImage>;

    /// Pad or crop to `width x height`, placing the image by `anchor` on a
    /// canvas of the image's background color.
    fn extent(&self, image: PixelImage, width: u32, height: u32, anchor: Anchor)
        -> Result<PixelImage>;

    /// Rotate by a multiple of 90 degrees.
    fn rotate(&self, image: PixelImage, degrees: i32) -> Result<PixelImage>;

    fn distort(&self, image: PixelImage, method: DistortMethod, arguments: &[f32])
        -> Result<PixelImage>;

    /// Compose `src` onto `dst` at the top-left corner.
    fn composite(
        &self,
        dst: PixelImage,
        src: &PixelImage,
        operator: CompositeOperator,
        args: Option<CompositeArgs>,
    ) -> Result<PixelImage>;

    fn clone_image(&self, image: &PixelImage) -> PixelImage;

    fn evaluate(&self, image: PixelImage, channel: Channel, op: EvaluateOp, value: f32)
        -> Result<PixelImage>;

    fn blur(&self, image: PixelImage, radius: u32, sigma: f32) -> Result<PixelImage>;

    fn set_colorspace(&self, image: PixelImage, colorspace: Colorspace) -> Result<PixelImage>;

    fn set_alpha(&self, image: PixelImage, mode: AlphaMode) -> Result<PixelImage>;

    fn set_background_color(&self, image: PixelImage, color: Color) -> Result<PixelImage>;

    fn set_virtual_pixel(&self, image: PixelImage, virtual_pixel: VirtualPixel)
        -> Result<PixelImage>;

    /// Blend RGB toward `color` by `percent`.
    fn colorize(&self, image: PixelImage, color: Color, percent: Percent) -> Result<PixelImage>;

    /// Surround the image with a `width`-pixel frame of `color`.
    fn border(&self, image: PixelImage, color: Color, width: u32) -> Result<PixelImage>;

    /// New image filled with `color`.
    fn canvas(&self, color: Color, width: u32, height: u32) -> Result<PixelImage>;
}

/// In-process raster implementation of `ImagingPrimitives`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterPrimitives;

impl RasterPrimitives {
    pub fn new() -> Self {
        Self
    }
}

fn map_pixels(pixels: &mut RgbaImage, f: impl Fn(&mut [u8]) + Sync + Send) {
    pixels.par_chunks_mut(4).for_each(f);
}

impl ImagingPrimitives for RasterPrimitives {
    fn decode(&self, buffer: &ImageBuffer) -> Result<PixelImage> {
        let pixels = decode_rgba(buffer.bytes())?;
        Ok(PixelImage::from_rgba(pixels))
    }

    fn encode(
        &self,
        image: &PixelImage,
        format: BufferFormat,
        options: EncodeOptions,
    ) -> Result<ImageBuffer> {
        let bytes = encoder::encode(&image.to_dynamic(), format, options)?;
        Ok(ImageBuffer::new(bytes, image.dimensions(), format))
    }

    fn dimensions(&self, bytes: &[u8]) -> Result<Dimensions> {
        read_dimensions(bytes)
    }

    #[instrument(level = "trace", skip(self, image))]
    fn resize(
        &self,
        image: PixelImage,
        width: u32,
        height: u32,
        fit: ResizeFit,
    ) -> Result<PixelImage> {
        if width == 0 || height == 0 {
            return Err(MockupError::invalid_resize_dimensions(width, height));
        }
        let (w, h) = calc_resize_dimensions(image.width(), image.height(), width, height, fit);
        let pixels = resize_rgba(image.pixels.clone(), w, h)?;
        Ok(image.with_pixels(pixels))
    }

    fn extent(
        &self,
        image: PixelImage,
        width: u32,
        height: u32,
        anchor: Anchor,
    ) -> Result<PixelImage> {
        if width == 0 || height == 0 {
            return Err(MockupError::invalid_argument(
                "extent",
                format!("{width}x{height}"),
                "extent must not be empty",
            ));
        }
        check_dimensions(width, height)?;
        let (ox, oy) = (anchor.x as i64, anchor.y as i64);
        let fill = image.background.to_array();
        let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba(fill));
        for (x, y, px) in image.pixels.enumerate_pixels() {
            let (cx, cy) = (x as i64 + ox, y as i64 + oy);
            if cx < 0 || cy < 0 || cx >= width as i64 || cy >= height as i64 {
                continue;
            }
            let target = canvas.get_pixel_mut(cx as u32, cy as u32);
            target.0 = if image.alpha_enabled {
                blend::blend_pixel(CompositeOperator::Over, fill, true, px.0, true)
            } else {
                px.0
            };
        }
        Ok(image.with_pixels(canvas))
    }

    fn rotate(&self, image: PixelImage, degrees: i32) -> Result<PixelImage> {
        let pixels = match degrees.rem_euclid(360) {
            0 => return Ok(image),
            90 => image::imageops::rotate90(&image.pixels),
            180 => image::imageops::rotate180(&image.pixels),
            270 => image::imageops::rotate270(&image.pixels),
            _ => return Err(MockupError::invalid_rotation_angle(degrees)),
        };
        Ok(image.with_pixels(pixels))
    }

    #[instrument(level = "trace", skip(self, image, arguments))]
    fn distort(
        &self,
        image: PixelImage,
        method: DistortMethod,
        arguments: &[f32],
    ) -> Result<PixelImage> {
        let pixels = match method {
            DistortMethod::Perspective => common::run_with_panic_policy("distort:perspective", || {
                distort::perspective(
                    &image.pixels,
                    arguments,
                    image.sample_edge(),
                    image.alpha_enabled,
                )
            })?,
        };
        Ok(image.with_pixels(pixels))
    }

    fn composite(
        &self,
        mut dst: PixelImage,
        src: &PixelImage,
        operator: CompositeOperator,
        args: Option<CompositeArgs>,
    ) -> Result<PixelImage> {
        let contract = operator.contract();
        if contract.requires.contains(OperatorRequirement::ARGS) && args.is_none() {
            return Err(MockupError::invalid_argument(
                "composite",
                operator.name(),
                "operator requires compose arguments",
            ));
        }
        match operator {
            CompositeOperator::Displace => {
                let Some(CompositeArgs::Displace(amplitude)) = args else {
                    return Err(MockupError::invalid_argument(
                        "composite",
                        operator.name(),
                        "displace requires an amplitude",
                    ));
                };
                let edge = dst.sample_edge();
                let alpha_enabled = dst.alpha_enabled;
                blend::displace_in_place(&mut dst.pixels, alpha_enabled, &src.pixels, amplitude, edge);
            }
            CompositeOperator::CopyAlpha => {
                blend::copy_alpha_in_place(&mut dst.pixels, src.layer());
                dst.alpha_enabled = true;
            }
            _ => {
                let alpha_enabled = dst.alpha_enabled;
                blend::blend_in_place(operator, &mut dst.pixels, alpha_enabled, src.layer())?;
            }
        }
        Ok(dst)
    }

    fn clone_image(&self, image: &PixelImage) -> PixelImage {
        image.clone()
    }

    fn evaluate(
        &self,
        mut image: PixelImage,
        channel: Channel,
        op: EvaluateOp,
        value: f32,
    ) -> Result<PixelImage> {
        let amount = if op.takes_percent() {
            Percent::new("evaluate", value)?.fraction() * 255.0
        } else if value.is_finite() {
            value
        } else {
            return Err(MockupError::invalid_argument(
                "evaluate",
                value.to_string(),
                "value must be finite",
            ));
        };
        let apply = move |v: u8| -> u8 {
            let v = v as f32;
            let out = match op {
                EvaluateOp::Subtract => v - amount,
                EvaluateOp::Negate => 255.0 - v,
            };
            out.round().clamp(0.0, 255.0) as u8
        };
        let (rgb, alpha) = match channel {
            Channel::Rgb => (true, false),
            Channel::Alpha => (false, true),
        };
        map_pixels(&mut image.pixels, |px| {
            if rgb {
                for c in &mut px[..3] {
                    *c = apply(*c);
                }
            }
            if alpha {
                px[3] = apply(px[3]);
            }
        });
        Ok(image)
    }

    #[instrument(level = "trace", skip(self, image))]
    fn blur(&self, image: PixelImage, radius: u32, sigma: f32) -> Result<PixelImage> {
        let pixels = blur::gaussian_blur(&image.pixels, radius, sigma, image.alpha_enabled)?;
        Ok(image.with_pixels(pixels))
    }

    fn set_colorspace(&self, mut image: PixelImage, colorspace: Colorspace) -> Result<PixelImage> {
        if colorspace == Colorspace::Gray {
            map_pixels(&mut image.pixels, |px| {
                let l = common::luminance(px[0], px[1], px[2]);
                px[..3].copy_from_slice(&[l, l, l]);
            });
        }
        image.colorspace = colorspace;
        Ok(image)
    }

    fn set_alpha(&self, mut image: PixelImage, mode: AlphaMode) -> Result<PixelImage> {
        match mode {
            AlphaMode::Off => image.alpha_enabled = false,
            AlphaMode::On => image.alpha_enabled = true,
            AlphaMode::Remove => {
                if image.alpha_enabled {
                    let bg = image.background.to_array();
                    map_pixels(&mut image.pixels, |px| {
                        let out = blend::blend_pixel(
                            CompositeOperator::Over,
                            bg,
                            true,
                            [px[0], px[1], px[2], px[3]],
                            true,
                        );
                        px.copy_from_slice(&out);
                    });
                }
            }
        }
        Ok(image)
    }

    fn set_background_color(&self, mut image: PixelImage, color: Color) -> Result<PixelImage> {
        image.background = color;
        Ok(image)
    }

    fn set_virtual_pixel(
        &self,
        mut image: PixelImage,
        virtual_pixel: VirtualPixel,
    ) -> Result<PixelImage> {
        image.virtual_pixel = virtual_pixel;
        Ok(image)
    }

    fn colorize(&self, mut image: PixelImage, color: Color, percent: Percent) -> Result<PixelImage> {
        let t = percent.fraction();
        let target = [color.r as f32, color.g as f32, color.b as f32];
        map_pixels(&mut image.pixels, |px| {
            for c in 0..3 {
                let v = px[c] as f32 * (1.0 - t) + target[c] * t;
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        });
        Ok(image)
    }

    fn border(&self, image: PixelImage, color: Color, width: u32) -> Result<PixelImage> {
        if width == 0 {
            return Ok(image);
        }
        let new_w = image
            .width()
            .checked_add(width.saturating_mul(2))
            .ok_or_else(|| MockupError::dimension_exceeds_limit(u32::MAX, crate::engine::MAX_DIMENSION))?;
        let new_h = image
            .height()
            .checked_add(width.saturating_mul(2))
            .ok_or_else(|| MockupError::dimension_exceeds_limit(u32::MAX, crate::engine::MAX_DIMENSION))?;
        check_dimensions(new_w, new_h)?;
        let mut framed = RgbaImage::from_pixel(new_w, new_h, image::Rgba(color.to_array()));
        image::imageops::replace(&mut framed, &image.pixels, width as i64, width as i64);
        Ok(image.with_pixels(framed))
    }

    fn canvas(&self, color: Color, width: u32, height: u32) -> Result<PixelImage> {
        if width == 0 || height == 0 {
            return Err(MockupError::invalid_argument(
                "canvas",
                format!("{width}x{height}"),
                "canvas must not be empty",
            ));
        }
        check_dimensions(width, height)?;
        Ok(PixelImage::from_rgba(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba(color.to_array()),
        )))
    }
}
