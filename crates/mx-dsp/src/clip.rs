//! Master output clipping
//!
//! Inputs within ±6V pass untouched in both modes. Soft mode bends the
//! 6V..12V region with a cubic that meets the linear part with unity slope
//! and flattens out at 10V:
//!
//! ```text
//! u = |x| - 6
//! f = 6 + u - u³/108      (6 < |x| < 12)
//! f = 10                  (|x| ≥ 12)
//! ```

use mx_core::{ClipMode, Sample, StereoSample, MAX_VOLTAGE};

/// Start of the soft knee (V)
pub const SOFT_KNEE: Sample = 6.0;
/// Input level where the soft curve reaches the ceiling (V)
pub const SOFT_LIMIT: Sample = 12.0;

#[inline]
pub fn soft_clip(x: Sample) -> Sample {
    let mag = x.abs();
    if mag <= SOFT_KNEE {
        return x;
    }
    let y = if mag >= SOFT_LIMIT {
        MAX_VOLTAGE
    } else {
        let u = mag - SOFT_KNEE;
        SOFT_KNEE + u - u * u * u / 108.0
    };
    y.copysign(x)
}

#[inline]
pub fn hard_clip(x: Sample) -> Sample {
    x.clamp(-MAX_VOLTAGE, MAX_VOLTAGE)
}

#[inline]
pub fn clip(x: Sample, mode: ClipMode) -> Sample {
    if x.is_nan() {
        return 0.0;
    }
    match mode {
        ClipMode::Soft => soft_clip(x),
        ClipMode::Hard => hard_clip(x),
    }
}

#[inline]
pub fn clip_stereo(x: StereoSample, mode: ClipMode) -> StereoSample {
    StereoSample::new(clip(x.left, mode), clip(x.right, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_region() {
        for mode in [ClipMode::Soft, ClipMode::Hard] {
            for x in [-6.0, -3.3, 0.0, 2.5, 6.0] {
                assert_eq!(clip(x, mode), x);
            }
        }
    }

    #[test]
    fn test_soft_knee_is_c1_continuous() {
        let eps = 1e-6;
        let below = soft_clip(SOFT_KNEE - eps);
        let above = soft_clip(SOFT_KNEE + eps);
        assert!((above - below).abs() < 3e-6);

        let h = 1e-4;
        let slope = (soft_clip(SOFT_KNEE + h) - soft_clip(SOFT_KNEE)) / h;
        assert!((slope - 1.0).abs() < 1e-4);

        let slope_top = (soft_clip(SOFT_LIMIT) - soft_clip(SOFT_LIMIT - h)) / h;
        assert!(slope_top.abs() < 1e-3);
        assert!((soft_clip(SOFT_LIMIT) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_soft_clip_is_odd_and_bounded() {
        for i in 0..200 {
            let x = i as f64 * 0.1;
            assert_eq!(soft_clip(-x), -soft_clip(x));
            assert!(soft_clip(x) <= 10.0);
        }
        assert_eq!(soft_clip(50.0), 10.0);
        assert_eq!(soft_clip(f64::INFINITY), 10.0);
    }

    #[test]
    fn test_hard_clip() {
        assert_eq!(clip(11.0, ClipMode::Hard), 10.0);
        assert_eq!(clip(-11.0, ClipMode::Hard), -10.0);
        assert_eq!(clip(f64::NAN, ClipMode::Hard), 0.0);
    }
}
