// src/engine/distort.rs
//
// Four-point perspective distortion. The output keeps the input size; each
// output pixel is inverse-mapped through the homography and sampled
// bilinearly, with the virtual-pixel policy outside the source.

use crate::engine::sample::{sample_bilinear, SampleEdge};
use crate::error::{MockupError, Result};
use image::RgbaImage;
use rayon::prelude::*;

/// Projective transform `(x, y) -> ((h0x + h1y + h2) / w, (h3x + h4y + h5) / w)`
/// with `w = h6x + h7y + 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography([f64; 8]);

impl Homography {
    /// Solve the transform taking each `from[i]` to `to[i]`.
    pub fn from_points(from: &[(f32, f32); 4], to: &[(f32, f32); 4]) -> Result<Self> {
        let mut a = [[0.0f64; 9]; 8];
        for i in 0..4 {
            let (x, y) = (from[i].0 as f64, from[i].1 as f64);
            let (u, v) = (to[i].0 as f64, to[i].1 as f64);
            a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
            a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v, v];
        }
        solve_8x8(a).map(Homography)
    }

    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let h = &self.0;
        let w = h[6] * x + h[7] * y + 1.0;
        if w.abs() < 1e-12 {
            return None;
        }
        Some(((h[0] * x + h[1] * y + h[2]) / w, (h[3] * x + h[4] * y + h[5]) / w))
    }
}

/// Gaussian elimination with partial pivoting on an augmented 8x9 system.
fn solve_8x8(mut a: [[f64; 9]; 8]) -> Result<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-10 {
            return Err(MockupError::operation_failed(
                "distort",
                "perspective control points are degenerate",
            ));
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }
    let mut h = [0.0f64; 8];
    for (i, value) in h.iter_mut().enumerate() {
        *value = a[i][8] / a[i][i];
    }
    Ok(h)
}

/// Perspective-distort `src` with `[sx, sy, dx, dy] x 4` control points.
pub fn perspective(
    src: &RgbaImage,
    arguments: &[f32],
    edge: SampleEdge,
    alpha_enabled: bool,
) -> Result<RgbaImage> {
    if arguments.len() != 16 {
        return Err(MockupError::invalid_argument(
            "distort",
            format!("{} arguments", arguments.len()),
            "perspective distortion takes 16 numbers (4 point pairs)",
        ));
    }
    if arguments.iter().any(|v| !v.is_finite()) {
        return Err(MockupError::invalid_argument(
            "distort",
            "non-finite coordinate",
            "control points must be finite",
        ));
    }
    let mut from = [(0.0, 0.0); 4];
    let mut to = [(0.0, 0.0); 4];
    for (i, quad) in arguments.chunks_exact(4).enumerate() {
        from[i] = (quad[0], quad[1]);
        to[i] = (quad[2], quad[3]);
    }
    // Inverse map: output (destination) coordinates back into the source.
    let inverse = Homography::from_points(&to, &from)?;

    let (width, height) = src.dimensions();
    let mut out = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return Ok(out);
    }
    let outside = match edge {
        SampleEdge::Constant(px) => px,
        SampleEdge::Clamp => [0, 0, 0, 0],
    };
    let stride = width as usize * 4;

    out.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let px = match inverse.apply(x as f64 + 0.5, y as f64 + 0.5) {
                    Some((u, v)) => sample_bilinear(
                        src,
                        (u - 0.5) as f32,
                        (v - 0.5) as f32,
                        edge,
                        alpha_enabled,
                    ),
                    None => outside,
                };
                row[x * 4..x * 4 + 4].copy_from_slice(&px);
            }
        });
    Ok(out)
}
