// src/engine/maps.rs
//
// Map generation stage. Derives, from the template and its mask:
// - normalized map: grayscale template with the mask as its opacity
// - adjustment map: per-pixel color correction (mask / flat fill)
// - displacement map: blurred fabric relief driving the Displace compose
// - lighting map: highlights/shadows for the Hard-light compose

use crate::config::{BlendParameters, Percent};
use crate::engine::buffer::ImageBuffer;
use crate::engine::encoder::EncodeOptions;
use crate::engine::primitives::{ImagingPrimitives, PixelImage};
use crate::error::Result;
use crate::ops::{AlphaMode, BufferFormat, Channel, Colorspace, CompositeOperator, EvaluateOp};
use tracing::debug;

/// The three maps the layer compositor consumes.
#[derive(Clone, Debug)]
pub struct MapSet {
    pub displacement: ImageBuffer,
    pub lighting: ImageBuffer,
    pub adjustment: ImageBuffer,
}

/// Grayscale template whose opacity is the mask's luminance.
pub fn normalize<P>(p: &P, template: &ImageBuffer, mask: &ImageBuffer) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let template = p.decode(template)?;
    let template = p.set_alpha(template, AlphaMode::Off)?;
    let template = p.set_colorspace(template, Colorspace::Gray)?;
    let mask = p.decode(mask)?;
    let mask = p.set_alpha(mask, AlphaMode::Off)?;
    let normalized = p.composite(template, &mask, CompositeOperator::CopyAlpha, None)?;
    p.encode(&normalized, BufferFormat::Intermediate, EncodeOptions::STAGE)
}

/// Template clone flooded with the adjustment fill, divided into the mask.
pub fn adjust<P>(
    p: &P,
    template: &ImageBuffer,
    mask: &ImageBuffer,
    blend: &BlendParameters,
) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let template = p.decode(template)?;
    let fill = p.clone_image(&template);
    let fill = p.colorize(fill, blend.adjustment_fill, Percent::FULL)?;
    let mask = p.decode(mask)?;
    let adjustment = p.composite(fill, &mask, CompositeOperator::DivideSrc, None)?;
    p.encode(&adjustment, BufferFormat::Intermediate, EncodeOptions::STAGE)
}

/// Darken, flatten onto neutral gray and drop alpha; shared head of the
/// displacement and lighting maps.
fn flatten_on_gray<P>(
    p: &P,
    normalized: PixelImage,
    subtract: Percent,
    blend: &BlendParameters,
) -> Result<PixelImage>
where
    P: ImagingPrimitives + ?Sized,
{
    let image = p.evaluate(normalized, Channel::Rgb, EvaluateOp::Subtract, subtract.get())?;
    let image = p.set_background_color(image, blend.neutral_gray)?;
    let image = p.set_alpha(image, AlphaMode::Remove)?;
    p.set_alpha(image, AlphaMode::Off)
}

pub fn displace<P>(p: &P, normalized: &ImageBuffer, blend: &BlendParameters) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let subtract = blend.displacement_percent()?;
    let image = p.decode(normalized)?;
    let image = flatten_on_gray(p, image, subtract, blend)?;
    let image = p.blur(image, blend.blur_radius, blend.blur_sigma)?;
    p.encode(&image, BufferFormat::Png, EncodeOptions::STAGE)
}

pub fn light<P>(p: &P, normalized: &ImageBuffer, blend: &BlendParameters) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let subtract = blend.lighting_percent()?;
    let image = p.decode(normalized)?;
    let image = flatten_on_gray(p, image, subtract, blend)?;
    let gray = p.clone_image(&image);
    let gray = p.colorize(gray, blend.neutral_gray, Percent::FULL)?;
    let lit = p.composite(gray, &image, CompositeOperator::Lighten, None)?;
    p.encode(&lit, BufferFormat::Png, EncodeOptions::STAGE)
}

/// Build every map. The normalized map is computed once and shared by the
/// displacement and lighting branches; all three maps are built in parallel.
pub fn generate_maps<P>(
    p: &P,
    template: &ImageBuffer,
    mask: &ImageBuffer,
    blend: &BlendParameters,
) -> Result<MapSet>
where
    P: ImagingPrimitives + ?Sized,
{
    // Reject bad percentages before the first pixel is touched.
    blend.displacement_percent()?;
    blend.lighting_percent()?;

    let (relief, adjustment) = rayon::join(
        || -> Result<(ImageBuffer, ImageBuffer)> {
            let normalized = normalize(p, template, mask)?;
            debug!(target: "mockup_engine::maps", bytes = normalized.len(), "normalized map ready");
            let (displacement, lighting) = rayon::join(
                || displace(p, &normalized, blend),
                || light(p, &normalized, blend),
            );
            Ok((displacement?, lighting?))
        },
        || adjust(p, template, mask, blend),
    );
    let (displacement, lighting) = relief?;
    Ok(MapSet {
        displacement,
        lighting,
        adjustment: adjustment?,
    })
}
