// src/engine/buffer.rs
//
// Encoded image buffers and the per-run arena that owns them.
// Buffers are immutable once produced; stages refer to each other's output
// through `BufferHandle`s instead of temp file names.

use crate::engine::decoder::{detect_format, read_dimensions};
use crate::error::{MockupError, Result};
use crate::ops::BufferFormat;
use image::ImageFormat;
use std::fmt;
use std::sync::Arc;

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Encoded bytes plus the pixel dimensions they decode to.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    bytes: Arc<[u8]>,
    dimensions: Dimensions,
    format: BufferFormat,
}

impl ImageBuffer {
    pub fn new(bytes: impl Into<Arc<[u8]>>, dimensions: Dimensions, format: BufferFormat) -> Self {
        Self {
            bytes: bytes.into(),
            dimensions,
            format,
        }
    }

    /// Wrap bytes of unknown provenance, reading format and dimensions from
    /// the header. Pixels are not decoded.
    pub fn from_encoded(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        let format = match detect_format(&bytes) {
            Some(ImageFormat::Jpeg) => BufferFormat::Jpeg,
            Some(ImageFormat::Png) => BufferFormat::Png,
            Some(ImageFormat::Qoi) => BufferFormat::Intermediate,
            Some(other) => {
                return Err(MockupError::unsupported_format(format!("{other:?}").to_lowercase()))
            }
            None => return Err(MockupError::decode_failed("unrecognized image header")),
        };
        let dimensions = read_dimensions(&bytes)?;
        Ok(Self {
            bytes,
            dimensions,
            format,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageBuffer {
    // Skip the payload; buffers are megabytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("dimensions", &self.dimensions)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Index of a buffer inside a `BufferArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(usize);

impl BufferHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Append-only store of every buffer produced during one pipeline run.
/// Dropped together with the run.
#[derive(Debug, Default)]
pub struct BufferArena {
    buffers: Vec<(&'static str, ImageBuffer)>,
}

impl BufferArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `buffer` under a producer label and hand back its handle.
    pub fn insert(&mut self, label: &'static str, buffer: ImageBuffer) -> BufferHandle {
        self.buffers.push((label, buffer));
        BufferHandle(self.buffers.len() - 1)
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&ImageBuffer> {
        self.buffers.get(handle.0).map(|(_, buffer)| buffer)
    }

    pub fn label(&self, handle: BufferHandle) -> Option<&'static str> {
        self.buffers.get(handle.0).map(|(label, _)| *label)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total encoded bytes held by the arena.
    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(|(_, b)| b.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BufferHandle, &'static str, &ImageBuffer)> {
        self.buffers
            .iter()
            .enumerate()
            .map(|(i, (label, buffer))| (BufferHandle(i), *label, buffer))
    }
}
