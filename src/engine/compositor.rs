// src/engine/compositor.rs
//
// Layer compositor: applies the displacement, lighting and adjustment maps
// to the warped artwork while keeping the artwork's own alpha shape.

use crate::config::BlendParameters;
use crate::engine::buffer::ImageBuffer;
use crate::engine::encoder::EncodeOptions;
use crate::engine::maps::MapSet;
use crate::engine::primitives::{ImagingPrimitives, PixelImage};
use crate::error::Result;
use crate::ops::{AlphaMode, BufferFormat, Color, CompositeArgs, CompositeOperator, OperatorEffect};
use tracing::trace;

/// One map applied to the artwork.
#[derive(Clone, Copy, Debug)]
pub struct LayerSpec<'a> {
    pub name: &'static str,
    pub map: &'a ImageBuffer,
    pub operator: CompositeOperator,
    pub args: Option<CompositeArgs>,
}

/// The fixed layer order: displacement, lighting, adjustment.
pub fn layer_stack<'a>(maps: &'a MapSet, blend: &BlendParameters) -> [LayerSpec<'a>; 3] {
    [
        LayerSpec {
            name: "displacement",
            map: &maps.displacement,
            operator: CompositeOperator::Displace,
            args: Some(CompositeArgs::Displace(blend.displacement_amplitude)),
        },
        LayerSpec {
            name: "lighting",
            map: &maps.lighting,
            operator: CompositeOperator::HardLight,
            args: None,
        },
        LayerSpec {
            name: "adjustment",
            map: &maps.adjustment,
            operator: CompositeOperator::Multiply,
            args: None,
        },
    ]
}

/// Composite `src` onto `dst` with `operator`, then put back the alpha `dst`
/// had before the effect.
///
/// The alpha snapshot is taken here, from exactly the image being modified.
/// Images with alpha switched off are composited directly: blends leave
/// their stored alpha alone.
pub fn compose_alpha_preserving<P>(
    p: &P,
    dst: PixelImage,
    src: &PixelImage,
    operator: CompositeOperator,
    args: Option<CompositeArgs>,
) -> Result<PixelImage>
where
    P: ImagingPrimitives + ?Sized,
{
    if !dst.alpha_enabled() {
        return p.composite(dst, src, operator, args);
    }
    let snapshot = p.clone_image(&dst);
    let effected = p.composite(dst, src, operator, args)?;
    p.composite(effected, &snapshot, CompositeOperator::CopyAlpha, None)
}

/// Apply one layer, restoring alpha only for operators that blend it.
pub fn apply_layer<P>(p: &P, artwork: PixelImage, layer: &LayerSpec<'_>) -> Result<PixelImage>
where
    P: ImagingPrimitives + ?Sized,
{
    let map = p.decode(layer.map)?;
    trace!(target: "mockup_engine::compositor", layer = layer.name, operator = %layer.operator, "applying layer");
    if layer
        .operator
        .contract()
        .effects
        .contains(OperatorEffect::BLENDS_ALPHA)
    {
        compose_alpha_preserving(p, artwork, &map, layer.operator, layer.args)
    } else {
        p.composite(artwork, &map, layer.operator, layer.args)
    }
}

/// Border the warped artwork, bake transparency into color and run it
/// through every layer of the stack.
pub fn composite_layers<P>(
    p: &P,
    warped: &ImageBuffer,
    maps: &MapSet,
    blend: &BlendParameters,
) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let artwork = p.decode(warped)?;
    let artwork = p.border(artwork, Color::TRANSPARENT, blend.border_width)?;
    let bordered = p.encode(&artwork, BufferFormat::Intermediate, EncodeOptions::STAGE)?;

    let artwork = p.decode(&bordered)?;
    let artwork = p.set_background_color(artwork, Color::TRANSPARENT)?;
    let mut artwork = p.set_alpha(artwork, AlphaMode::Remove)?;

    for layer in layer_stack(maps, blend).iter() {
        artwork = apply_layer(p, artwork, layer)?;
    }
    p.encode(&artwork, BufferFormat::Intermediate, EncodeOptions::STAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::primitives::RasterPrimitives;
    use image::RgbaImage;

    fn stage(p: &RasterPrimitives, img: RgbaImage) -> ImageBuffer {
        p.encode(&PixelImage::from_rgba(img), BufferFormat::Intermediate, EncodeOptions::STAGE)
            .unwrap()
    }

    fn neutral_maps(p: &RasterPrimitives, w: u32, h: u32) -> MapSet {
        MapSet {
            // 127 pulls samples a fraction of a pixel up-left, away from the border.
            displacement: stage(p, RgbaImage::from_pixel(w, h, image::Rgba([127, 127, 127, 255]))),
            lighting: stage(p, RgbaImage::from_pixel(w, h, image::Rgba([128, 128, 128, 255]))),
            adjustment: stage(p, RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]))),
        }
    }

    #[test]
    fn alpha_preserving_hard_light_keeps_alpha() {
        let p = RasterPrimitives::new();
        let dst = PixelImage::from_rgba(RgbaImage::from_fn(4, 1, |x, _| {
            image::Rgba([200, 100, 50, (x * 80) as u8])
        }));
        let src = PixelImage::from_rgba(RgbaImage::from_pixel(4, 1, image::Rgba([255, 255, 255, 255])));
        let out = compose_alpha_preserving(&p, dst.clone(), &src, CompositeOperator::HardLight, None)
            .unwrap();
        for x in 0..4 {
            assert_eq!(out.pixels().get_pixel(x, 0).0[3], dst.pixels().get_pixel(x, 0).0[3]);
        }
        // Plain hard light against an opaque source would make everything opaque.
        let plain = p.composite(dst, &src, CompositeOperator::HardLight, None).unwrap();
        assert_eq!(plain.pixels().get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn stack_order_and_contracts() {
        let p = RasterPrimitives::new();
        let maps = neutral_maps(&p, 2, 2);
        let stack = layer_stack(&maps, &BlendParameters::default());
        let ops: Vec<_> = stack.iter().map(|l| l.operator).collect();
        assert_eq!(
            ops,
            vec![
                CompositeOperator::Displace,
                CompositeOperator::HardLight,
                CompositeOperator::Multiply
            ]
        );
        assert!(stack[0].args.is_some());
    }

    #[test]
    fn composite_layers_adds_border_and_keeps_shape() {
        let p = RasterPrimitives::new();
        let warped = stage(
            &p,
            RgbaImage::from_fn(20, 20, |x, _| {
                if x < 10 {
                    image::Rgba([255, 0, 0, 255])
                } else {
                    image::Rgba([0, 0, 0, 0])
                }
            }),
        );
        let maps = neutral_maps(&p, 22, 22);
        let out = composite_layers(&p, &warped, &maps, &BlendParameters::default()).unwrap();
        assert_eq!(out.width(), 22);
        assert_eq!(out.height(), 22);

        let img = p.decode(&out).unwrap();
        // Border is transparent.
        assert_eq!(img.pixels().get_pixel(0, 5).0[3], 0);
        // Interior of the red half stays opaque red-ish.
        let px = img.pixels().get_pixel(4, 10).0;
        assert_eq!(px[3], 255);
        assert!(px[0] > 240 && px[1] < 10, "{px:?}");
        // Transparent half stays transparent.
        assert_eq!(img.pixels().get_pixel(18, 10).0[3], 0);
    }
}
