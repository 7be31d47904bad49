// src/engine/sample.rs
//
// Bilinear sampling with virtual-pixel edge handling, shared by the
// displacement and perspective kernels.

use crate::ops::{Color, VirtualPixel};
use image::RgbaImage;

/// What a sample outside the image returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEdge {
    /// Repeat the nearest edge pixel.
    Clamp,
    /// A constant color.
    Constant([u8; 4]),
}

impl SampleEdge {
    pub fn from_virtual_pixel(virtual_pixel: VirtualPixel, background: Color) -> Self {
        match virtual_pixel {
            VirtualPixel::Edge => SampleEdge::Clamp,
            VirtualPixel::Background => SampleEdge::Constant(background.to_array()),
        }
    }
}

#[inline]
fn fetch(img: &RgbaImage, x: i64, y: i64, edge: SampleEdge) -> [u8; 4] {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if x >= 0 && y >= 0 && x < w && y < h {
        return img.get_pixel(x as u32, y as u32).0;
    }
    match edge {
        SampleEdge::Clamp => img
            .get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)
            .0,
        SampleEdge::Constant(px) => px,
    }
}

/// Sample at continuous pixel-index coordinates (`(0, 0)` is the center of
/// the top-left pixel).
///
/// With `alpha_weighted`, neighbours are mixed in premultiplied space so
/// transparent texels don't darken the result; otherwise every channel is
/// interpolated independently.
pub fn sample_bilinear(
    img: &RgbaImage,
    x: f32,
    y: f32,
    edge: SampleEdge,
    alpha_weighted: bool,
) -> [u8; 4] {
    if img.width() == 0 || img.height() == 0 || !x.is_finite() || !y.is_finite() {
        return match edge {
            SampleEdge::Constant(px) => px,
            SampleEdge::Clamp => [0, 0, 0, 0],
        };
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (xi, yi) = (x0 as i64, y0 as i64);

    if fx == 0.0 && fy == 0.0 {
        return fetch(img, xi, yi, edge);
    }

    let taps = [
        (fetch(img, xi, yi, edge), (1.0 - fx) * (1.0 - fy)),
        (fetch(img, xi + 1, yi, edge), fx * (1.0 - fy)),
        (fetch(img, xi, yi + 1, edge), (1.0 - fx) * fy),
        (fetch(img, xi + 1, yi + 1, edge), fx * fy),
    ];

    let mut acc = [0.0f32; 4];
    for (px, w) in taps {
        let a = if alpha_weighted { px[3] as f32 / 255.0 } else { 1.0 };
        for c in 0..3 {
            acc[c] += w * a * px[c] as f32;
        }
        acc[3] += w * px[3] as f32;
    }

    let mut out = [0u8; 4];
    out[3] = acc[3].round().clamp(0.0, 255.0) as u8;
    let norm = if alpha_weighted { acc[3] / 255.0 } else { 1.0 };
    if norm > 0.0 {
        for c in 0..3 {
            out[c] = (acc[c] / norm).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
