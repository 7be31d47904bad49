// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy for codecs and stages, and small pixel helpers.

use crate::error::{MockupError, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec or pixel routine, turning a panic inside third-party code
/// into `MockupError::InternalPanic` tagged with `label`.
///
/// Decoders for untrusted input (mozjpeg in particular) may unwind on
/// malformed data; the pipeline must report that as a failed stage rather
/// than take the caller down with it.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            tracing::error!(target: "mockup_engine::panic", label, %detail, "panic caught");
            Err(MockupError::internal_panic(format!("{label}: {detail}")))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Rec.709 luma of an 8-bit RGB triple.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let l = 0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32;
    l.round().clamp(0.0, 255.0) as u8
}

#[inline]
pub fn to_unit(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline]
pub fn from_unit(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_is_converted() {
        let result: Result<()> = run_with_panic_policy("decode:test", || panic!("boom"));
        let err = result.unwrap_err();
        assert!(matches!(err, MockupError::InternalPanic { .. }));
        assert!(err.to_string().contains("decode:test: boom"));
    }

    #[test]
    fn test_ok_and_err_pass_through() {
        assert_eq!(run_with_panic_policy("t", || Ok(7)).unwrap(), 7);
        let err = run_with_panic_policy::<(), _>("t", || Err(MockupError::decode_failed("x")))
            .unwrap_err();
        assert!(matches!(err, MockupError::DecodeFailed { .. }));
    }

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 0, 0), 54);
        assert_eq!(luminance(0, 255, 0), 182);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(from_unit(to_unit(200)), 200);
        assert_eq!(from_unit(1.5), 255);
        assert_eq!(from_unit(-0.2), 0);
    }
}
