// tests/edge_cases.rs
//
// Edge case tests for mockup-engine
// Tests boundary values, degenerate masks and artwork, and error handling

use image::RgbaImage;
use mockup_engine::config::{MockupConfig, Percent};
use mockup_engine::engine::{
    calc_resize_dimensions, check_dimensions, Dimensions, ImageBuffer, MockupInputs,
    MockupPipeline, RasterPrimitives, Stage,
};
use mockup_engine::error::{ErrorCategory, MockupError};
use mockup_engine::ops::{Amplitude, OutputFormat, ResizeFit};

fn encode_png(img: RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

// Helper to create a valid JPEG of specified size
fn create_valid_jpeg(width: u32, height: u32, value: u8) -> Vec<u8> {
    use mozjpeg::ColorSpace;
    use mozjpeg::Compress;

    let pixels = vec![value; (width * height * 3) as usize];
    let mut comp = Compress::new(ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(95.0);
    comp.set_color_space(ColorSpace::JCS_YCbCr);

    let mut output = Vec::new();
    {
        let mut writer = comp.start_compress(&mut output).unwrap();
        let stride = width as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).unwrap();
        }
        writer.finish().unwrap();
    }
    output
}

fn solid(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    encode_png(RgbaImage::from_pixel(w, h, image::Rgba(px)))
}

fn render(template: Vec<u8>, mask: Vec<u8>, artwork: Vec<u8>) -> RgbaImage {
    let inputs = MockupInputs::from_encoded(template, mask, artwork).unwrap();
    let pipeline = MockupPipeline::new(RasterPrimitives::new(), MockupConfig::preview()).unwrap();
    let output = pipeline.run(&inputs).unwrap();
    image::load_from_memory(output.buffer.bytes()).unwrap().to_rgba8()
}

const GRAY: [u8; 4] = [204, 204, 204, 255];

mod mask_tests {
    use super::*;

    #[test]
    fn test_black_mask_returns_template() {
        let out = render(solid(300, 200, GRAY), solid(300, 200, [0, 0, 0, 255]), solid(50, 50, [255, 0, 0, 255]));
        assert!(out.pixels().all(|px| px.0 == GRAY));
    }

    #[test]
    fn test_white_mask_shows_artwork_only_inside_quad() {
        let out = render(
            solid(400, 300, GRAY),
            solid(400, 300, [255, 255, 255, 255]),
            solid(60, 100, [0, 0, 255, 255]),
        );
        let inside = out.get_pixel(300, 150).0;
        assert!(inside[2] > 200 && inside[0] < 50, "{inside:?}");
        assert_eq!(out.get_pixel(100, 150).0, GRAY);
    }
}

mod artwork_tests {
    use super::*;

    #[test]
    fn test_fully_transparent_artwork_leaves_template() {
        let out = render(
            solid(300, 200, GRAY),
            solid(300, 200, [255, 255, 255, 255]),
            solid(40, 40, [255, 0, 0, 0]),
        );
        assert!(out.pixels().all(|px| px.0 == GRAY));
    }

    #[test]
    fn test_1x1_artwork() {
        let out = render(
            solid(400, 300, GRAY),
            solid(400, 300, [255, 255, 255, 255]),
            solid(1, 1, [0, 255, 0, 255]),
        );
        assert_eq!(out.dimensions(), (400, 300));
    }

    #[test]
    fn test_rotated_artwork() {
        let inputs = MockupInputs::from_encoded(
            solid(400, 300, GRAY),
            solid(400, 300, [255, 255, 255, 255]),
            solid(60, 100, [255, 0, 0, 255]),
        )
        .unwrap();
        let mut config = MockupConfig::preview();
        config.rotation_degrees = 90;
        let pipeline = MockupPipeline::new(RasterPrimitives::new(), config).unwrap();
        let output = pipeline.run(&inputs).unwrap();
        assert_eq!(output.buffer.dimensions(), Dimensions::new(400, 300));
    }

    #[test]
    fn test_jpeg_inputs() {
        let inputs = MockupInputs::from_encoded(
            create_valid_jpeg(320, 240, 204),
            create_valid_jpeg(320, 240, 255),
            create_valid_jpeg(64, 64, 30),
        )
        .unwrap();
        let pipeline = MockupPipeline::new(RasterPrimitives::new(), MockupConfig::default()).unwrap();
        let output = pipeline.run(&inputs).unwrap();
        assert_eq!(output.buffer.dimensions(), Dimensions::new(320, 240));
    }
}

mod input_errors {
    use super::*;

    #[test]
    fn test_empty_bytes_rejected() {
        let err = ImageBuffer::from_encoded(Vec::new()).unwrap_err();
        assert!(matches!(err, MockupError::DecodeFailed { .. }));
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0]);
        let err = ImageBuffer::from_encoded(gif).unwrap_err();
        assert!(matches!(err, MockupError::UnsupportedFormat { .. }));
        assert_eq!(err.category(), ErrorCategory::CodecError);
    }

    #[test]
    fn test_corrupt_artwork_fails_geometry() {
        let mut inputs = MockupInputs::from_encoded(
            solid(400, 300, GRAY),
            solid(400, 300, [255, 255, 255, 255]),
            solid(60, 100, [255, 0, 0, 255]),
        )
        .unwrap();
        // Valid signature, garbage chunks.
        let mut corrupt = b"\x89PNG\r\n\x1a\n".to_vec();
        corrupt.extend_from_slice(&[0xAB; 64]);
        inputs.artwork = ImageBuffer::new(corrupt, inputs.artwork.dimensions(), inputs.artwork.format());
        let pipeline = MockupPipeline::new(RasterPrimitives::new(), MockupConfig::preview()).unwrap();
        let failure = pipeline.run(&inputs).unwrap_err();
        assert_eq!(failure.stage, Stage::Geometry);
        // Map generation ran alongside and is still recorded.
        assert!(failure.report.stage(Stage::Maps).is_some());
    }
}

mod config_boundaries {
    use super::*;

    #[test]
    fn test_percent_boundaries_accepted() {
        let mut config = MockupConfig::preview();
        config.blend.displacement_subtract = 0.0;
        config.blend.lighting_subtract = 100.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_percent_rejected() {
        assert!(Percent::new("lighting_subtract", -0.01).is_err());
        let mut config = MockupConfig::preview();
        config.blend.displacement_subtract = 100.5;
        assert!(MockupPipeline::new(RasterPrimitives::new(), config).is_err());
    }

    #[test]
    fn test_zero_amplitude_renders() {
        let inputs = MockupInputs::from_encoded(
            solid(300, 200, GRAY),
            solid(300, 200, [255, 255, 255, 255]),
            solid(40, 40, [255, 0, 0, 255]),
        )
        .unwrap();
        let mut config = MockupConfig::preview();
        config.blend.displacement_amplitude = Amplitude::new(0.0, 0.0);
        let pipeline = MockupPipeline::new(RasterPrimitives::new(), config).unwrap();
        assert!(pipeline.run(&inputs).is_ok());
    }

    #[test]
    fn test_non_right_angle_rotation_rejected() {
        let mut config = MockupConfig::default();
        config.rotation_degrees = 45;
        let err = MockupPipeline::new(RasterPrimitives::new(), config).unwrap_err();
        assert!(matches!(err, MockupError::InvalidRotationAngle { degrees: 45 }));
    }

    #[test]
    fn test_jpeg_quality_limits() {
        let config = MockupConfig::default().with_output_format(OutputFormat::Jpeg { quality: 100 });
        assert!(config.validate().is_ok());
        let config = MockupConfig::default().with_output_format(OutputFormat::Jpeg { quality: 255 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quad_outside_canvas_rejected() {
        let mut config = MockupConfig::default();
        config.working_canvas = Dimensions::new(500, 500);
        assert!(config.validate().is_err());
    }
}

mod limits {
    use super::*;

    #[test]
    fn test_dimension_limits() {
        assert!(check_dimensions(32768, 1).is_ok());
        assert!(matches!(
            check_dimensions(32769, 1),
            Err(MockupError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(20000, 20000),
            Err(MockupError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_resize_dimensions_never_zero() {
        assert_eq!(calc_resize_dimensions(10_000, 1, 502, 855, ResizeFit::Inside), (502, 1));
        assert_eq!(calc_resize_dimensions(1, 10_000, 502, 855, ResizeFit::Inside), (1, 855));
        assert_eq!(calc_resize_dimensions(300, 500, 502, 855, ResizeFit::Fill), (502, 855));
    }
}
