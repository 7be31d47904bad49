// src/ops.rs
//
// Imaging operation vocabulary shared by the primitives and the pipeline stages.
// These are plain values - the work happens in engine::primitives.

use crate::error::{MockupError, Result};
use bitflags::bitflags;
use std::fmt;

/// Composition operators understood by the imaging primitives.
///
/// `dst.composite(src, op)` always places `src` at the top-left corner of
/// `dst`; pixels outside the overlap are left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositeOperator {
    /// Porter-Duff source-over.
    Over,
    /// Separable multiply blend.
    Multiply,
    /// Source divided by destination.
    DivideSrc,
    /// Multiply or screen depending on the source value.
    HardLight,
    /// Keeps the brighter of source and destination per channel.
    Lighten,
    /// Offsets destination sampling by the source's gray value. Requires
    /// `CompositeArgs::Displace`.
    Displace,
    /// Replaces destination alpha with source alpha, or with source
    /// luminance when the source has its alpha channel switched off.
    CopyAlpha,
}

bitflags! {
    /// What an operator needs before it can run.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OperatorRequirement: u8 {
        /// Operator needs explicit compose arguments.
        const ARGS = 0b0000_0001;
    }
}

bitflags! {
    /// Side effects an operator has on the destination.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OperatorEffect: u8 {
        /// Destination alpha becomes the union of source and destination alpha.
        const BLENDS_ALPHA = 0b0000_0001;
        /// Destination pixels are resampled from other positions.
        const RESAMPLES_DST = 0b0000_0010;
        /// Destination alpha is overwritten.
        const WRITES_ALPHA = 0b0000_0100;
        /// Destination color channels change.
        const WRITES_COLOR = 0b0000_1000;
    }
}

/// Static contract of a composition operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorContract {
    pub name: &'static str,
    pub requires: OperatorRequirement,
    pub effects: OperatorEffect,
}

impl CompositeOperator {
    pub const ALL: [CompositeOperator; 7] = [
        CompositeOperator::Over,
        CompositeOperator::Multiply,
        CompositeOperator::DivideSrc,
        CompositeOperator::HardLight,
        CompositeOperator::Lighten,
        CompositeOperator::Displace,
        CompositeOperator::CopyAlpha,
    ];

    pub fn contract(&self) -> OperatorContract {
        let blend = OperatorEffect::BLENDS_ALPHA | OperatorEffect::WRITES_COLOR;
        match self {
            CompositeOperator::Over => OperatorContract {
                name: "over",
                requires: OperatorRequirement::empty(),
                effects: blend,
            },
            CompositeOperator::Multiply => OperatorContract {
                name: "multiply",
                requires: OperatorRequirement::empty(),
                effects: blend,
            },
            CompositeOperator::DivideSrc => OperatorContract {
                name: "divide_src",
                requires: OperatorRequirement::empty(),
                effects: blend,
            },
            CompositeOperator::HardLight => OperatorContract {
                name: "hard_light",
                requires: OperatorRequirement::empty(),
                effects: blend,
            },
            CompositeOperator::Lighten => OperatorContract {
                name: "lighten",
                requires: OperatorRequirement::empty(),
                effects: blend,
            },
            CompositeOperator::Displace => OperatorContract {
                name: "displace",
                requires: OperatorRequirement::ARGS,
                effects: OperatorEffect::RESAMPLES_DST | OperatorEffect::WRITES_COLOR,
            },
            CompositeOperator::CopyAlpha => OperatorContract {
                name: "copy_alpha",
                requires: OperatorRequirement::empty(),
                effects: OperatorEffect::WRITES_ALPHA,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.contract().name
    }
}

impl fmt::Display for CompositeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extra arguments for operators that declare `OperatorRequirement::ARGS`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompositeArgs {
    Displace(Amplitude),
}

/// Displacement amplitude in pixels, written `XxY` (e.g. `20x20`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Amplitude {
    pub x: f32,
    pub y: f32,
}

impl Amplitude {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Parse the `XxY` geometry form. A single number applies to both axes.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &'static str| {
            MockupError::invalid_argument("displacement_amplitude", value.to_string(), reason)
        };
        let trimmed = value.trim();
        let (x, y) = match trimmed.split_once(|c: char| c == 'x' || c == 'X') {
            Some((x, y)) => (x, y),
            None => (trimmed, trimmed),
        };
        let x: f32 = x.trim().parse().map_err(|_| invalid("expected XxY"))?;
        let y: f32 = y.trim().parse().map_err(|_| invalid("expected XxY"))?;
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return Err(invalid("amplitudes must be finite and non-negative"));
        }
        Ok(Self { x, y })
    }
}

impl fmt::Display for Amplitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

/// Alpha channel control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaMode {
    /// Disable the alpha channel; stored values are kept but ignored.
    Off,
    /// Re-enable a previously disabled alpha channel.
    On,
    /// Flatten onto the background color, baking transparency into color.
    Remove,
}

/// Channels an evaluate operation touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Rgb,
    Alpha,
}

/// Per-pixel arithmetic for `evaluate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluateOp {
    /// Subtract `value` percent of the full range.
    Subtract,
    /// Invert the channel; `value` is ignored.
    Negate,
}

impl EvaluateOp {
    /// Operators whose value is a percentage of the channel range.
    pub fn takes_percent(&self) -> bool {
        matches!(self, EvaluateOp::Subtract)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Colorspace {
    Srgb,
    Gray,
}

/// How distortions sample outside the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualPixel {
    /// Clamp to the nearest edge pixel.
    Edge,
    /// Use the image's background color.
    Background,
}

/// Placement of an image inside an extent canvas: `+x+y` offset from the
/// north-west corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub x: i32,
    pub y: i32,
}

impl Anchor {
    pub fn north_west(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::north_west(0, 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistortMethod {
    /// Four source/destination point pairs, `[sx, sy, dx, dy] x 4`.
    Perspective,
}

/// Resize semantics for the canonical artwork size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResizeFit {
    /// Preserve aspect ratio and fit inside the box.
    #[default]
    Inside,
    /// Ignore aspect ratio and fill the box exactly.
    Fill,
}

/// Straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// 50% gray (`#7f7f7f`).
    pub const GREY50: Color = Color::rgb(127, 127, 127);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(value: &str) -> Result<Self> {
        let invalid = || {
            MockupError::invalid_argument("color", value.to_string(), "expected #rrggbb or #rrggbbaa")
        };
        let hex = value.strip_prefix('#').ok_or_else(invalid)?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Self::rgba(byte(0)?, byte(2)?, byte(4)?, a))
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Encoded format of an image buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    Jpeg,
    Png,
    /// Lossless, fast format for buffers that will be decoded again.
    Intermediate,
}

impl BufferFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferFormat::Jpeg => "jpeg",
            BufferFormat::Png => "png",
            BufferFormat::Intermediate => "intermediate",
        }
    }
}

/// Output format for the final mockup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl OutputFormat {
    /// Parse a format name (`jpeg`, `jpg`, `png`); JPEG quality defaults to 90.
    pub fn parse(format: &str, quality: Option<u8>) -> Result<Self> {
        let q = quality.unwrap_or(90);
        match format.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg { quality: q }),
            "png" => Ok(Self::Png),
            other => Err(MockupError::invalid_argument(
                "output_format",
                other.to_string(),
                "expected jpeg, jpg or png",
            )),
        }
    }

    pub fn buffer_format(&self) -> BufferFormat {
        match self {
            OutputFormat::Jpeg { .. } => BufferFormat::Jpeg,
            OutputFormat::Png => BufferFormat::Png,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 90 }
    }
}
