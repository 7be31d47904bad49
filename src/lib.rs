// lib.rs
//
// mockup-engine: product mockup compositor
//
// Takes a template photo, a mask of its printable region and a piece of
// artwork, and renders the artwork as if printed on the product:
// - Perspective warp onto the template's fold
// - Fabric relief through a displacement map
// - Highlights and shadows through a hard-light lighting map
// - Color correction through a multiply adjustment map

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;

pub use config::{BlendParameters, MockupConfig, Percent, PerspectiveQuad};
pub use engine::{
    AssetIds, AssetSource, Dimensions, FileAssetSource, FileSink, ImageBuffer, ImagingPrimitives,
    MemoryAssetSource, MemorySink, MockupInputs, MockupOutput, MockupPipeline, PipelineFailure,
    PipelineState, RasterPrimitives, RenderSink, RunReport, Stage,
};
pub use error::{ErrorCategory, MockupError, Result};
pub use ops::{CompositeOperator, OutputFormat};

/// Read image dimensions WITHOUT decoding pixels.
/// Only the header bytes are parsed.
pub fn inspect(bytes: &[u8]) -> Result<Dimensions> {
    engine::read_dimensions(bytes)
}

/// Render a full mockup with the default raster primitives and a small
/// working geometry, for fuzz targets.
#[cfg(feature = "fuzzing")]
pub fn render_for_fuzzing(template: &[u8], mask: &[u8], artwork: &[u8]) -> Result<ImageBuffer> {
    let inputs = MockupInputs::from_encoded(template, mask, artwork)?;
    let config = MockupConfig {
        artwork_size: Dimensions::new(32, 48),
        working_canvas: Dimensions::new(64, 64),
        perspective: PerspectiveQuad::new([
            (0.0, 0.0),
            (8.0, 4.0),
            (32.0, 0.0),
            (48.0, 4.0),
            (32.0, 48.0),
            (48.0, 56.0),
            (0.0, 48.0),
            (8.0, 56.0),
        ]),
        output_format: OutputFormat::Png,
        ..MockupConfig::default()
    };
    let pipeline = MockupPipeline::new(RasterPrimitives::new(), config)?;
    pipeline
        .run(&inputs)
        .map(|output| output.buffer)
        .map_err(|failure| failure.error)
}
