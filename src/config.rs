// src/config.rs
//
// Pipeline configuration: canonical artwork geometry, the template's
// perspective quad and the blend constants used by map generation.

use crate::engine::{Dimensions, MAX_BLUR_RADIUS};
use crate::error::{MockupError, Result};
use crate::ops::{Amplitude, Anchor, Color, OutputFormat, ResizeFit};

/// Canonical artwork size the perspective quad's source points refer to.
pub const ARTWORK_SIZE: Dimensions = Dimensions::new(502, 855);

/// Opaque canvas the warped artwork is flattened onto.
pub const WORKING_CANVAS: Dimensions = Dimensions::new(1000, 1000);

/// Source -> destination point pairs of the default template fold.
const DEFAULT_QUAD: [(f32, f32); 8] = [
    (0.0, 0.0),
    (231.0, 44.0),
    (502.0, 0.0),
    (767.0, 44.0),
    (502.0, 855.0),
    (767.0, 955.0),
    (0.0, 855.0),
    (231.0, 955.0),
];

/// A percentage validated to lie in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Percent(f32);

impl Percent {
    pub const FULL: Percent = Percent(100.0);

    pub fn new(name: &'static str, value: f32) -> Result<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(MockupError::invalid_argument(
                name,
                value.to_string(),
                "percentages must lie in [0, 100]",
            ));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f32 {
        self.0
    }

    /// The percentage as a fraction of the full channel range.
    pub fn fraction(self) -> f32 {
        self.0 / 100.0
    }
}

/// Four source/destination point pairs mapping the artwork rectangle onto
/// the template's fold.
///
/// Points are stored interleaved (`src0, dst0, src1, dst1, ...`), the same
/// order the perspective distortion consumes them in.
#[derive(Clone, Debug, PartialEq)]
pub struct PerspectiveQuad {
    points: [(f32, f32); 8],
}

impl PerspectiveQuad {
    pub fn new(points: [(f32, f32); 8]) -> Self {
        Self { points }
    }

    /// Build from a flat `sx,sy,dx,dy` argument list (16 numbers).
    pub fn from_arguments(args: &[f32]) -> Result<Self> {
        if args.len() != 16 {
            return Err(MockupError::invalid_argument(
                "perspective_quad",
                format!("{} values", args.len()),
                "expected exactly 8 (x,y) points",
            ));
        }
        let mut points = [(0.0, 0.0); 8];
        for (point, pair) in points.iter_mut().zip(args.chunks_exact(2)) {
            *point = (pair[0], pair[1]);
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32); 8] {
        &self.points
    }

    /// Flat argument list for `ImagingPrimitives::distort`.
    pub fn arguments(&self) -> Vec<f32> {
        self.points.iter().flat_map(|&(x, y)| [x, y]).collect()
    }

    pub fn source_points(&self) -> [(f32, f32); 4] {
        [self.points[0], self.points[2], self.points[4], self.points[6]]
    }

    pub fn destination_points(&self) -> [(f32, f32); 4] {
        [self.points[1], self.points[3], self.points[5], self.points[7]]
    }

    /// Every coordinate must be finite and inside `canvas`.
    pub fn validate(&self, canvas: Dimensions) -> Result<()> {
        for &(x, y) in &self.points {
            let inside = x.is_finite()
                && y.is_finite()
                && (0.0..=canvas.width as f32).contains(&x)
                && (0.0..=canvas.height as f32).contains(&y);
            if !inside {
                return Err(MockupError::invalid_argument(
                    "perspective_quad",
                    format!("({x}, {y})"),
                    format!(
                        "point lies outside the {}x{} working canvas",
                        canvas.width, canvas.height
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl Default for PerspectiveQuad {
    fn default() -> Self {
        Self::new(DEFAULT_QUAD)
    }
}

/// Numeric constants of the map generation and layer compositing stages.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendParameters {
    /// Evaluate-subtract applied to the normalized map before blurring it
    /// into the displacement map.
    pub displacement_subtract: f32,
    /// Evaluate-subtract applied to the normalized map for the lighting map.
    pub lighting_subtract: f32,
    pub displacement_amplitude: Amplitude,
    pub blur_radius: u32,
    pub blur_sigma: f32,
    /// Flood color of the adjustment map's template clone.
    pub adjustment_fill: Color,
    /// Background for flattened maps and flood color of the lighting clone.
    pub neutral_gray: Color,
    /// Transparent border added around the warped artwork.
    pub border_width: u32,
}

impl Default for BlendParameters {
    fn default() -> Self {
        Self {
            displacement_subtract: 30.0,
            lighting_subtract: 50.0,
            displacement_amplitude: Amplitude::new(20.0, 20.0),
            blur_radius: 10,
            blur_sigma: 5.0,
            adjustment_fill: Color::rgb(0xf1, 0xf1, 0xf1),
            neutral_gray: Color::GREY50,
            border_width: 1,
        }
    }
}

impl BlendParameters {
    pub fn displacement_percent(&self) -> Result<Percent> {
        Percent::new("displacement_subtract", self.displacement_subtract)
    }

    pub fn lighting_percent(&self) -> Result<Percent> {
        Percent::new("lighting_subtract", self.lighting_subtract)
    }

    /// Set the displacement amplitude from its `XxY` form, e.g. `"20x20"`.
    pub fn with_displacement_amplitude(mut self, geometry: &str) -> Result<Self> {
        self.displacement_amplitude = Amplitude::parse(geometry)?;
        Ok(self)
    }

    /// Set the adjustment fill from `#rrggbb` or `#rrggbbaa`.
    pub fn with_adjustment_fill(mut self, hex: &str) -> Result<Self> {
        self.adjustment_fill = Color::from_hex(hex)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.displacement_percent()?;
        self.lighting_percent()?;
        if !self.blur_sigma.is_finite() || self.blur_sigma <= 0.0 {
            return Err(MockupError::invalid_argument(
                "blur_sigma",
                self.blur_sigma.to_string(),
                "sigma must be > 0",
            ));
        }
        if self.blur_radius > MAX_BLUR_RADIUS {
            return Err(MockupError::invalid_argument(
                "blur_radius",
                self.blur_radius.to_string(),
                format!("radius must be <= {MAX_BLUR_RADIUS}"),
            ));
        }
        let amp = self.displacement_amplitude;
        if !amp.x.is_finite() || !amp.y.is_finite() || amp.x < 0.0 || amp.y < 0.0 {
            return Err(MockupError::invalid_argument(
                "displacement_amplitude",
                amp.to_string(),
                "amplitudes must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Everything a pipeline run needs besides its three input images.
#[derive(Clone, Debug, PartialEq)]
pub struct MockupConfig {
    pub artwork_size: Dimensions,
    pub resize_fit: ResizeFit,
    /// Orientation correction hook; 0 in every current template.
    pub rotation_degrees: i32,
    pub extent_anchor: Anchor,
    pub perspective: PerspectiveQuad,
    pub working_canvas: Dimensions,
    pub blend: BlendParameters,
    pub output_format: OutputFormat,
    /// Run geometry and map generation concurrently.
    pub parallel: bool,
}

impl Default for MockupConfig {
    fn default() -> Self {
        Self {
            artwork_size: ARTWORK_SIZE,
            resize_fit: ResizeFit::Inside,
            rotation_degrees: 0,
            extent_anchor: Anchor::north_west(0, 0),
            perspective: PerspectiveQuad::default(),
            working_canvas: WORKING_CANVAS,
            blend: BlendParameters::default(),
            output_format: OutputFormat::default(),
            parallel: true,
        }
    }
}

impl MockupConfig {
    /// Lossless preview preset: PNG output, otherwise the default template.
    pub fn preview() -> Self {
        Self {
            output_format: OutputFormat::Png,
            ..Self::default()
        }
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_blend(mut self, blend: BlendParameters) -> Self {
        self.blend = blend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.artwork_size.width == 0 || self.artwork_size.height == 0 {
            return Err(MockupError::invalid_resize_dimensions(
                self.artwork_size.width,
                self.artwork_size.height,
            ));
        }
        if self.rotation_degrees % 90 != 0 {
            return Err(MockupError::invalid_rotation_angle(self.rotation_degrees));
        }
        if self.working_canvas.width == 0 || self.working_canvas.height == 0 {
            return Err(MockupError::invalid_argument(
                "working_canvas",
                self.working_canvas.to_string(),
                "canvas must not be empty",
            ));
        }
        if let OutputFormat::Jpeg { quality } = self.output_format {
            if quality > 100 {
                return Err(MockupError::invalid_argument(
                    "quality",
                    quality.to_string(),
                    "JPEG quality must lie in [0, 100]",
                ));
            }
        }
        self.perspective.validate(self.working_canvas)?;
        self.blend.validate()
    }
}
