// src/engine/geometry.rs
//
// Geometry stage: bring the artwork to its canonical size, lay it out in
// template space and warp it onto the template's fold.

use crate::config::MockupConfig;
use crate::engine::buffer::{Dimensions, ImageBuffer};
use crate::engine::encoder::EncodeOptions;
use crate::engine::primitives::ImagingPrimitives;
use crate::error::Result;
use crate::ops::{BufferFormat, Color, CompositeOperator, DistortMethod, VirtualPixel};
use tracing::debug;

/// Warp `artwork` into template space.
///
/// The result is the working canvas (opaque black flattened under the
/// warped artwork) with the warped artwork's alpha restored, encoded in the
/// intermediate format.
pub fn warp<P>(
    primitives: &P,
    artwork: &ImageBuffer,
    template_dims: Dimensions,
    config: &MockupConfig,
) -> Result<ImageBuffer>
where
    P: ImagingPrimitives + ?Sized,
{
    let p = primitives;
    let size = config.artwork_size;

    let image = p.decode(artwork)?;
    let image = p.resize(image, size.width, size.height, config.resize_fit)?;
    let image = p.rotate(image, config.rotation_degrees)?;
    let image = p.extent(
        image,
        template_dims.width,
        template_dims.height,
        config.extent_anchor,
    )?;
    let image = p.set_background_color(image, Color::TRANSPARENT)?;
    let image = p.set_virtual_pixel(image, VirtualPixel::Background)?;
    let distorted = p.distort(
        image,
        DistortMethod::Perspective,
        &config.perspective.arguments(),
    )?;
    debug!(
        target: "mockup_engine::geometry",
        width = distorted.width(),
        height = distorted.height(),
        "artwork distorted"
    );

    let canvas = p.canvas(
        Color::BLACK,
        config.working_canvas.width,
        config.working_canvas.height,
    )?;
    let flattened = p.composite(canvas, &distorted, CompositeOperator::Over, None)?;
    let warped = p.composite(flattened, &distorted, CompositeOperator::CopyAlpha, None)?;

    p.encode(&warped, BufferFormat::Intermediate, EncodeOptions::STAGE)
}
