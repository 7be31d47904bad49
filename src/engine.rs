// src/engine.rs
//
// The core of mockup-engine. A staged pipeline that:
// 1. Warps the artwork onto the template's fold (geometry)
// 2. Derives displacement, lighting and adjustment maps from the template
// 3. Blends the warped artwork through those maps
// 4. Layers template, artwork and mask into the final mockup
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

// Shared plumbing
mod blend;
mod blur;
mod buffer;
mod common;
mod decoder;
mod distort;
mod encoder;
mod io;
mod resize;
mod sample;

// Imaging primitives and pipeline stages
mod assembler;
mod compositor;
mod geometry;
mod maps;
mod orchestrator;
mod primitives;

pub use assembler::{assemble, mask_overlay};
pub use blur::MAX_BLUR_RADIUS;
pub use buffer::{BufferArena, BufferHandle, Dimensions, ImageBuffer};
pub use common::run_with_panic_policy;
pub use compositor::{apply_layer, compose_alpha_preserving, composite_layers, layer_stack, LayerSpec};
pub use decoder::{check_dimensions, decode_image, read_dimensions};
pub use encoder::EncodeOptions;
pub use geometry::warp;
pub use io::{AssetSource, FileAssetSource, FileSink, MemoryAssetSource, MemorySink, RenderSink};
pub use maps::{adjust, displace, generate_maps, light, normalize, MapSet};
pub use orchestrator::{
    AssetIds, MockupInputs, MockupOutput, MockupPipeline, PipelineFailure, PipelineState,
    RunReport, Stage, StageResult,
};
pub use primitives::{ImagingPrimitives, PixelImage, RasterPrimitives};
pub use resize::calc_resize_dimensions;
