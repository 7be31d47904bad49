// src/engine/blend.rs
//
// Per-pixel composition kernels on straight-alpha RGBA8.
//
// Color operators follow the W3C separable blend model:
//   co = (1 - Sa)*Da*Cd + (1 - Da)*Sa*Cs + Sa*Da*B(Cd, Cs)
//   ao = Sa + Da - Sa*Da
// An image whose alpha channel is switched off contributes alpha 1.0 and
// keeps its stored alpha bytes untouched.

use crate::engine::common::{from_unit, luminance, to_unit};
use crate::engine::sample::{sample_bilinear, SampleEdge};
use crate::error::{MockupError, Result};
use crate::ops::{Amplitude, CompositeOperator};
use image::RgbaImage;
use rayon::prelude::*;

/// Alpha-channel state of one side of a composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layer<'a> {
    pub pixels: &'a RgbaImage,
    pub alpha_enabled: bool,
}

/// Separable blend function `B(Cd, Cs)` for the color operators.
#[inline]
fn blend_channel(op: CompositeOperator, cd: f32, cs: f32) -> f32 {
    match op {
        CompositeOperator::Over => cs,
        CompositeOperator::Multiply => cs * cd,
        CompositeOperator::Lighten => cs.max(cd),
        CompositeOperator::HardLight => {
            if cs <= 0.5 {
                cd * 2.0 * cs
            } else {
                screen(cd, 2.0 * cs - 1.0)
            }
        }
        CompositeOperator::DivideSrc => {
            if cd <= 0.0 {
                if cs > 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (cs / cd).min(1.0)
            }
        }
        // Not color blends; handled by their own kernels.
        CompositeOperator::Displace | CompositeOperator::CopyAlpha => cd,
    }
}

#[inline]
fn screen(cb: f32, cs: f32) -> f32 {
    cb + cs - cb * cs
}

/// Blend one source pixel onto one destination pixel.
#[inline]
pub fn blend_pixel(
    op: CompositeOperator,
    dst: [u8; 4],
    dst_alpha_enabled: bool,
    src: [u8; 4],
    src_alpha_enabled: bool,
) -> [u8; 4] {
    let sa = if src_alpha_enabled { to_unit(src[3]) } else { 1.0 };
    let da = if dst_alpha_enabled { to_unit(dst[3]) } else { 1.0 };
    let ao = sa + da - sa * da;

    let mut out = dst;
    if ao <= 0.0 {
        out[..3].copy_from_slice(&[0, 0, 0]);
        if dst_alpha_enabled {
            out[3] = 0;
        }
        return out;
    }
    for c in 0..3 {
        let cd = to_unit(dst[c]);
        let cs = to_unit(src[c]);
        let premul = (1.0 - sa) * da * cd + (1.0 - da) * sa * cs + sa * da * blend_channel(op, cd, cs);
        out[c] = from_unit(premul / ao);
    }
    if dst_alpha_enabled {
        out[3] = from_unit(ao);
    }
    out
}

/// Color blend of `src` onto `dst` over their top-left-aligned overlap.
pub fn blend_in_place(
    op: CompositeOperator,
    dst: &mut RgbaImage,
    dst_alpha_enabled: bool,
    src: Layer<'_>,
) -> Result<()> {
    if matches!(op, CompositeOperator::Displace | CompositeOperator::CopyAlpha) {
        return Err(MockupError::operation_failed(
            "composite",
            format!("'{op}' is not a color blend operator"),
        ));
    }
    let (dw, dh) = dst.dimensions();
    let (sw, sh) = src.pixels.dimensions();
    let (ow, oh) = (dw.min(sw) as usize, dh.min(sh) as usize);
    if ow == 0 || oh == 0 {
        return Ok(());
    }
    let dst_stride = dw as usize * 4;
    let src_stride = sw as usize * 4;
    let src_raw = src.pixels.as_raw();

    dst.par_chunks_mut(dst_stride)
        .take(oh)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src_raw[y * src_stride..y * src_stride + ow * 4];
            for (d, s) in row[..ow * 4].chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let out = blend_pixel(
                    op,
                    [d[0], d[1], d[2], d[3]],
                    dst_alpha_enabled,
                    [s[0], s[1], s[2], s[3]],
                    src.alpha_enabled,
                );
                d.copy_from_slice(&out);
            }
        });
    Ok(())
}

/// Replace destination alpha with source alpha, or with source luminance
/// when the source's alpha channel is off.
pub fn copy_alpha_in_place(dst: &mut RgbaImage, src: Layer<'_>) {
    let (dw, dh) = dst.dimensions();
    let (sw, sh) = src.pixels.dimensions();
    let (ow, oh) = (dw.min(sw) as usize, dh.min(sh) as usize);
    let dst_stride = dw as usize * 4;
    let src_stride = sw as usize * 4;
    let src_raw = src.pixels.as_raw();

    dst.par_chunks_mut(dst_stride)
        .take(oh)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src_raw[y * src_stride..y * src_stride + ow * 4];
            for (d, s) in row[..ow * 4].chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                d[3] = if src.alpha_enabled {
                    s[3]
                } else {
                    luminance(s[0], s[1], s[2])
                };
            }
        });
}

/// Resample `dst` through the displacement map `src`.
///
/// Red drives the horizontal offset and green the vertical one:
/// `offset = amplitude * (2v - 1)`, so 50% gray leaves a pixel in place.
/// Samples falling outside `dst` use `edge`.
pub fn displace_in_place(
    dst: &mut RgbaImage,
    dst_alpha_enabled: bool,
    map: &RgbaImage,
    amplitude: Amplitude,
    edge: SampleEdge,
) {
    let (dw, dh) = dst.dimensions();
    let (mw, mh) = map.dimensions();
    let (ow, oh) = (dw.min(mw) as usize, dh.min(mh) as usize);
    if ow == 0 || oh == 0 {
        return;
    }
    let original = dst.clone();
    let dst_stride = dw as usize * 4;

    dst.par_chunks_mut(dst_stride)
        .take(oh)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..ow {
                let m = map.get_pixel(x as u32, y as u32).0;
                let dx = amplitude.x * (2.0 * to_unit(m[0]) - 1.0);
                let dy = amplitude.y * (2.0 * to_unit(m[1]) - 1.0);
                let mut px = sample_bilinear(
                    &original,
                    x as f32 + dx,
                    y as f32 + dy,
                    edge,
                    dst_alpha_enabled,
                );
                if !dst_alpha_enabled {
                    px[3] = original.get_pixel(x as u32, y as u32).0[3];
                }
                row[x * 4..x * 4 + 4].copy_from_slice(&px);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE_GRAY: [u8; 4] = [128, 128, 128, 255];

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba(px))
    }

    #[test]
    fn over_opaque_source_replaces() {
        let out = blend_pixel(CompositeOperator::Over, [10, 20, 30, 255], true, [200, 0, 0, 255], true);
        assert_eq!(out, [200, 0, 0, 255]);
    }

    #[test]
    fn over_transparent_source_keeps_dst() {
        let out = blend_pixel(CompositeOperator::Over, [10, 20, 30, 255], true, [200, 0, 0, 0], true);
        assert_eq!(out, [10, 20, 30, 255]);
    }

    #[test]
    fn over_onto_transparent_dst_takes_src() {
        let out = blend_pixel(CompositeOperator::Over, [0, 0, 0, 0], true, [40, 50, 60, 128], true);
        assert_eq!(out, [40, 50, 60, 128]);
    }

    #[test]
    fn multiply_with_white_is_identity() {
        let out = blend_pixel(CompositeOperator::Multiply, [90, 120, 150, 255], true, [255, 255, 255, 255], true);
        assert_eq!(out, [90, 120, 150, 255]);
    }

    #[test]
    fn hard_light_with_mid_gray_is_near_identity() {
        let out = blend_pixel(CompositeOperator::HardLight, [90, 120, 150, 255], true, [127, 127, 127, 255], true);
        for c in 0..3 {
            assert!((out[c] as i32 - [90, 120, 150][c]).abs() <= 1, "{out:?}");
        }
    }

    #[test]
    fn hard_light_white_screens_to_white() {
        let out = blend_pixel(CompositeOperator::HardLight, [90, 120, 150, 255], true, [255, 255, 255, 255], true);
        assert_eq!(out, [255, 255, 255, 255]);
    }

    #[test]
    fn lighten_keeps_max() {
        let out = blend_pixel(CompositeOperator::Lighten, [10, 200, 30, 255], true, [100, 100, 100, 255], true);
        assert_eq!(out, [100, 200, 100, 255]);
    }

    #[test]
    fn divide_src_by_dst() {
        let out = blend_pixel(CompositeOperator::DivideSrc, [0xf1, 0xf1, 0xf1, 255], true, [255, 0, 120, 255], true);
        assert_eq!(out[0], 255);
        assert_eq!(out[1], 0);
        assert_eq!(out[2], from_unit(120.0 / 241.0));
    }

    #[test]
    fn divide_by_black_saturates() {
        let out = blend_pixel(CompositeOperator::DivideSrc, [0, 0, 0, 255], true, [5, 0, 0, 255], true);
        assert_eq!(&out[..3], &[255, 0, 0]);
    }

    #[test]
    fn alpha_off_dst_keeps_stored_alpha() {
        let out = blend_pixel(CompositeOperator::Over, [0, 0, 0, 7], false, [255, 255, 255, 255], true);
        assert_eq!(out, [255, 255, 255, 7]);
    }

    #[test]
    fn blend_only_touches_overlap() {
        let mut dst = solid(4, 4, [0, 0, 0, 255]);
        let src = solid(2, 3, [255, 255, 255, 255]);
        blend_in_place(
            CompositeOperator::Over,
            &mut dst,
            true,
            Layer { pixels: &src, alpha_enabled: true },
        )
        .unwrap();
        assert_eq!(dst.get_pixel(1, 2).0, [255, 255, 255, 255]);
        assert_eq!(dst.get_pixel(2, 2).0, [0, 0, 0, 255]);
        assert_eq!(dst.get_pixel(0, 3).0, [0, 0, 0, 255]);
    }

    #[test]
    fn blend_rejects_non_color_operator() {
        let mut dst = solid(1, 1, OPAQUE_GRAY);
        let src = dst.clone();
        assert!(blend_in_place(
            CompositeOperator::CopyAlpha,
            &mut dst,
            true,
            Layer { pixels: &src, alpha_enabled: true }
        )
        .is_err());
    }

    #[test]
    fn copy_alpha_uses_luminance_when_source_alpha_off() {
        let mut dst = solid(2, 1, OPAQUE_GRAY);
        let mut src = solid(2, 1, [255, 255, 255, 0]);
        src.put_pixel(1, 0, image::Rgba([0, 0, 0, 255]));
        copy_alpha_in_place(&mut dst, Layer { pixels: &src, alpha_enabled: false });
        assert_eq!(dst.get_pixel(0, 0).0[3], 255);
        assert_eq!(dst.get_pixel(1, 0).0[3], 0);

        copy_alpha_in_place(&mut dst, Layer { pixels: &src, alpha_enabled: true });
        assert_eq!(dst.get_pixel(0, 0).0[3], 0);
        assert_eq!(dst.get_pixel(1, 0).0[3], 255);
    }

    #[test]
    fn neutral_displacement_is_identity() {
        let mut dst = RgbaImage::from_fn(6, 5, |x, y| image::Rgba([(x * 40) as u8, (y * 50) as u8, 9, 255]));
        let before = dst.clone();
        // 127.5 is exact neutral; 128 shifts by amplitude/255, far below half a pixel.
        let map = solid(6, 5, [128, 128, 128, 255]);
        displace_in_place(&mut dst, true, &map, Amplitude::new(0.5, 0.5), SampleEdge::Clamp);
        assert_eq!(dst, before);
    }

    #[test]
    fn white_displacement_shifts_by_amplitude() {
        let mut dst = RgbaImage::from_fn(8, 1, |x, _| image::Rgba([(x * 30) as u8, 0, 0, 255]));
        let map = solid(8, 1, [255, 0, 0, 255]);
        displace_in_place(&mut dst, true, &map, Amplitude::new(2.0, 0.0), SampleEdge::Clamp);
        // Pixel 1 now samples pixel 3.
        assert_eq!(dst.get_pixel(1, 0).0[0], 90);
        // Past the right edge the sampler clamps.
        assert_eq!(dst.get_pixel(7, 0).0[0], 210);
    }
}
