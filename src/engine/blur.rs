// src/engine/blur.rs
//
// Separable Gaussian blur on RGBA8, Q16 fixed-point kernel, rows and
// columns processed in parallel with rayon. Edges clamp.

use crate::error::{MockupError, Result};
use image::RgbaImage;
use rayon::prelude::*;

/// Largest accepted blur radius (a 2049-tap kernel).
pub const MAX_BLUR_RADIUS: u32 = 1024;

/// Blur `img` with a `(2 * radius + 1)`-tap kernel of the given sigma.
///
/// When `alpha_enabled` the blur runs on premultiplied pixels and all four
/// channels are blurred; otherwise only RGB is blurred and the stored alpha
/// is left as is.
pub fn gaussian_blur(
    img: &RgbaImage,
    radius: u32,
    sigma: f32,
    alpha_enabled: bool,
) -> Result<RgbaImage> {
    if radius == 0 {
        return Ok(img.clone());
    }
    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Ok(img.clone());
    }

    let mut src = img.as_raw().clone();
    if alpha_enabled {
        premultiply(&mut src);
    }
    let channels = if alpha_enabled { 4 } else { 3 };

    let mut tmp = src.clone();
    horizontal_pass(&src, &mut tmp, width, &kernel, channels);
    let mut out = tmp.clone();
    vertical_pass(&tmp, &mut out, width, height, &kernel, channels);

    if alpha_enabled {
        unpremultiply(&mut out);
    }
    RgbaImage::from_raw(width, height, out)
        .ok_or_else(|| MockupError::operation_failed("blur", "output buffer size mismatch"))
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> Result<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(MockupError::invalid_argument(
            "blur_sigma",
            sigma.to_string(),
            "sigma must be > 0",
        ));
    }

    if radius > MAX_BLUR_RADIUS {
        return Err(MockupError::invalid_argument(
            "blur_radius",
            radius.to_string(),
            format!("radius must be <= {MAX_BLUR_RADIUS}"),
        ));
    }
    let r = i32::try_from(radius).map_err(|_| {
        MockupError::invalid_argument("blur_radius", radius.to_string(), "radius out of range")
    })?;
    let sigma = sigma as f64;
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = i as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(MockupError::operation_failed("blur", "gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round() as i64;
        let q = q.clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Put rounding drift on the center tap so the kernel sums to exactly 1.0.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, k: &[u32], channels: usize) {
    let radius = (k.len() / 2) as i64;
    let w = width as i64;
    let stride = width as usize * 4;
    dst.par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .for_each(|(out_row, row)| {
            for x in 0..w {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x + ki as i64 - radius).clamp(0, w - 1) as usize;
                    for c in 0..channels {
                        acc[c] += kw as u64 * row[sx * 4 + c] as u64;
                    }
                }
                let o = x as usize * 4;
                for c in 0..channels {
                    out_row[o + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32], channels: usize) {
    let radius = (k.len() / 2) as i64;
    let h = height as i64;
    let stride = width as usize * 4;
    dst.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            for x in 0..width as usize {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sy = (y as i64 + ki as i64 - radius).clamp(0, h - 1) as usize;
                    let idx = sy * stride + x * 4;
                    for c in 0..channels {
                        acc[c] += kw as u64 * src[idx + c] as u64;
                    }
                }
                for c in 0..channels {
                    out_row[x * 4 + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

fn premultiply(buf: &mut [u8]) {
    buf.par_chunks_mut(4).for_each(|px| {
        let a = px[3] as u32;
        for c in &mut px[..3] {
            *c = ((*c as u32 * a + 127) / 255) as u8;
        }
    });
}

fn unpremultiply(buf: &mut [u8]) {
    buf.par_chunks_mut(4).for_each(|px| {
        let a = px[3] as u32;
        if a == 0 {
            px[..3].copy_from_slice(&[0, 0, 0]);
            return;
        }
        for c in &mut px[..3] {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_0_is_identity() {
        let img = RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 3, 4]));
        assert_eq!(gaussian_blur(&img, 0, 1.0, true).unwrap(), img);
    }

    #[test]
    fn constant_image_is_identity() {
        let img = RgbaImage::from_pixel(9, 7, image::Rgba([10, 20, 30, 255]));
        assert_eq!(gaussian_blur(&img, 10, 5.0, true).unwrap(), img);
    }

    #[test]
    fn kernel_sums_to_one() {
        let k = gaussian_kernel_q16(10, 5.0).unwrap();
        assert_eq!(k.len(), 21);
        assert_eq!(k.iter().map(|&w| w as u64).sum::<u64>(), 65536);
        assert!(k[10] > k[0]);
    }

    #[test]
    fn invalid_sigma_is_rejected() {
        let img = RgbaImage::new(2, 2);
        assert!(gaussian_blur(&img, 3, 0.0, true).is_err());
        assert!(gaussian_blur(&img, 3, f32::NAN, true).is_err());
    }

    #[test]
    fn oversized_radius_is_rejected() {
        let img = RgbaImage::new(2, 2);
        assert!(gaussian_blur(&img, MAX_BLUR_RADIUS, 5.0, true).is_ok());
        for radius in [MAX_BLUR_RADIUS + 1, 1 << 29, u32::MAX] {
            let err = gaussian_blur(&img, radius, 5.0, true).unwrap_err();
            assert!(matches!(err, MockupError::InvalidArgument { ref name, .. } if name == "blur_radius"));
        }
    }

    #[test]
    fn blur_spreads_a_step_edge() {
        let img = RgbaImage::from_fn(20, 1, |x, _| {
            let v = if x < 10 { 0 } else { 255 };
            image::Rgba([v, v, v, 255])
        });
        let out = gaussian_blur(&img, 3, 1.5, true).unwrap();
        let left = out.get_pixel(9, 0).0[0];
        let right = out.get_pixel(10, 0).0[0];
        assert!(left > 0 && left < 128, "{left}");
        assert!(right > 128 && right < 255, "{right}");
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(19, 0).0[0], 255);
    }

    #[test]
    fn alpha_off_leaves_alpha_bytes() {
        let img = RgbaImage::from_fn(8, 8, |x, _| image::Rgba([(x * 30) as u8, 0, 0, (x * 20) as u8]));
        let out = gaussian_blur(&img, 2, 1.0, false).unwrap();
        for (a, b) in img.pixels().zip(out.pixels()) {
            assert_eq!(a.0[3], b.0[3]);
        }
    }
}
