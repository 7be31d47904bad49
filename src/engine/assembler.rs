// src/engine/assembler.rs
//
// Final assembly: template, composited artwork on top, and the template
// re-cut through the inverted mask on top of that.

use crate::engine::buffer::ImageBuffer;
use crate::engine::encoder::EncodeOptions;
use crate::engine::primitives::{ImagingPrimitives, PixelImage};
use crate::error::Result;
use crate::ops::{AlphaMode, Channel, CompositeOperator, EvaluateOp, OutputFormat};

/// Template clone that is opaque where the mask is black and clear where it
/// is white.
pub fn mask_overlay<P>(p: &P, template: &PixelImage, mask: &ImageBuffer) -> Result<PixelImage>
where
    P: ImagingPrimitives + ?Sized,
{
    let mask = p.decode(mask)?;
    let mask = p.set_alpha(mask, AlphaMode::Off)?;
    let overlay = p.clone_image(template);
    let overlay = p.composite(overlay, &mask, CompositeOperator::CopyAlpha, None)?;
    p.evaluate(overlay, Channel::Alpha, EvaluateOp::Negate, 0.0)
}

/// Layer artwork and mask overlay onto the template. The result always has
/// the template's dimensions.
///
/// The mask is layered as the template re-cut through it rather than raw:
/// an opaque mask composited Over would hide the template and artwork alike.
pub fn assemble<P>(
    p: &P,
    template: &ImageBuffer,
    artwork: &ImageBuffer,
    mask: &ImageBuffer,
    output: OutputFormat,
) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let base = p.decode(template)?;
    let overlay = mask_overlay(p, &base, mask)?;
    let artwork = p.decode(artwork)?;
    let composed = p.composite(base, &artwork, CompositeOperator::Over, None)?;
    let composed = p.composite(composed, &overlay, CompositeOperator::Over, None)?;
    let (format, options) = EncodeOptions::for_output(output);
    p.encode(&composed, format, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::Dimensions;
    use crate::engine::primitives::RasterPrimitives;
    use crate::ops::BufferFormat;
    use image::RgbaImage;

    fn png(p: &RasterPrimitives, img: RgbaImage) -> ImageBuffer {
        p.encode(&PixelImage::from_rgba(img), BufferFormat::Png, EncodeOptions::STAGE)
            .unwrap()
    }

    fn fixtures(p: &RasterPrimitives) -> (ImageBuffer, ImageBuffer, ImageBuffer) {
        let template = png(p, RgbaImage::from_pixel(30, 20, image::Rgba([204, 204, 204, 255])));
        let mask = png(
            p,
            RgbaImage::from_fn(30, 20, |x, _| {
                let v = if (10..20).contains(&x) { 255 } else { 0 };
                image::Rgba([v, v, v, 255])
            }),
        );
        // Larger than the template, opaque blue everywhere.
        let artwork = png(p, RgbaImage::from_pixel(40, 40, image::Rgba([0, 0, 255, 255])));
        (template, mask, artwork)
    }

    #[test]
    fn output_matches_template_dimensions() {
        let p = RasterPrimitives::new();
        let (template, mask, artwork) = fixtures(&p);
        let out = assemble(&p, &template, &artwork, &mask, OutputFormat::Png).unwrap();
        assert_eq!(out.dimensions(), Dimensions::new(30, 20));
        assert_eq!(out.format(), BufferFormat::Png);
    }

    #[test]
    fn mask_bounds_artwork_visibility() {
        let p = RasterPrimitives::new();
        let (template, mask, artwork) = fixtures(&p);
        let out = assemble(&p, &template, &artwork, &mask, OutputFormat::Png).unwrap();
        let img = p.decode(&out).unwrap();
        assert_eq!(img.pixels().get_pixel(15, 10).0, [0, 0, 255, 255]);
        assert_eq!(img.pixels().get_pixel(2, 10).0, [204, 204, 204, 255]);
        assert_eq!(img.pixels().get_pixel(25, 3).0, [204, 204, 204, 255]);
    }

    #[test]
    fn jpeg_output_by_default_format() {
        let p = RasterPrimitives::new();
        let (template, mask, artwork) = fixtures(&p);
        let out = assemble(&p, &template, &artwork, &mask, OutputFormat::default()).unwrap();
        assert_eq!(out.format(), BufferFormat::Jpeg);
        assert_eq!(out.dimensions(), Dimensions::new(30, 20));
    }

    #[test]
    fn overlay_alpha_is_inverted_mask() {
        let p = RasterPrimitives::new();
        let (template, mask, _) = fixtures(&p);
        let base = p.decode(&template).unwrap();
        let overlay = mask_overlay(&p, &base, &mask).unwrap();
        assert_eq!(overlay.pixels().get_pixel(15, 0).0[3], 0);
        assert_eq!(overlay.pixels().get_pixel(0, 0).0[3], 255);
    }
}
