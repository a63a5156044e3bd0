//! Anti-pop slew limiting
//!
//! Rate-limited ramps for gains that may jump (mute, solo, fader moves):
//! - `SlewLimiter` - scalar gain
//! - `SlewLimiter4` - a whole pan/fader `GainMatrix` in one pass
//!
//! `process(dt, target)` moves the output toward `target` by at most
//! `rate * dt` and returns the new output.

use crate::pan_law::GainMatrix;

/// Fast rate for mute/solo transitions (units per second)
pub const SLEW_RATE_FAST: f64 = 125.0;
/// Slow rate for continuous fader/pan motion (units per second)
pub const SLEW_RATE_SLOW: f64 = 25.0;

// ============ Scalar ============

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlewLimiter {
    out: f64,
    rise: f64,
    fall: f64,
}

impl SlewLimiter {
    pub fn new(rate: f64) -> Self {
        Self::with_rates(rate, rate)
    }

    pub fn with_rates(rise: f64, fall: f64) -> Self {
        Self {
            out: 0.0,
            rise: rise.abs(),
            fall: fall.abs(),
        }
    }

    pub fn fast() -> Self {
        Self::new(SLEW_RATE_FAST)
    }

    pub fn slow() -> Self {
        Self::new(SLEW_RATE_SLOW)
    }

    #[inline]
    pub fn process(&mut self, dt: f64, target: f64) -> f64 {
        // A NaN output would poison every later clamp
        if !target.is_finite() {
            return self.out;
        }
        let up = self.out + self.rise * dt;
        let down = self.out - self.fall * dt;
        self.out = target.clamp(down, up);
        self.out
    }

    /// Jump straight to a value
    #[inline]
    pub fn set(&mut self, value: f64) {
        self.out = value;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.out = 0.0;
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.out
    }
}

// ============ 4-wide ============

/// Slews all four coefficients of a gain matrix together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlewLimiter4 {
    out: GainMatrix,
    rate: f64,
}

impl SlewLimiter4 {
    pub fn new(rate: f64) -> Self {
        Self {
            out: GainMatrix::ZERO,
            rate: rate.abs(),
        }
    }

    pub fn slow() -> Self {
        Self::new(SLEW_RATE_SLOW)
    }

    #[inline]
    pub fn process(&mut self, dt: f64, target: GainMatrix) -> GainMatrix {
        let step = self.rate * dt;
        for (out, tgt) in self.out.0.iter_mut().zip(target.0) {
            if !tgt.is_finite() {
                continue;
            }
            *out = tgt.clamp(*out - step, *out + step);
        }
        self.out
    }

    #[inline]
    pub fn set(&mut self, value: GainMatrix) {
        self.out = value;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.out = GainMatrix::ZERO;
    }

    #[inline]
    pub fn value(&self) -> GainMatrix {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 48000.0;

    #[test]
    fn test_step_converges_monotonically() {
        let mut slew = SlewLimiter::slow();
        let mut prev = slew.value();
        let mut steps = 0;
        while slew.value() < 1.0 {
            let out = slew.process(DT, 1.0);
            assert!(out > prev && out <= 1.0);
            prev = out;
            steps += 1;
            assert!(steps < 10_000);
        }
        // |delta| / rate seconds, give or take one sample of rounding
        let expected = (1.0 / SLEW_RATE_SLOW / DT).round() as i32;
        assert!((steps - expected).abs() <= 1, "took {steps} steps, expected {expected}");
    }

    #[test]
    fn test_falling_step() {
        let mut slew = SlewLimiter::fast();
        slew.set(1.0);
        let out = slew.process(DT, 0.0);
        assert!((1.0 - out - SLEW_RATE_FAST * DT).abs() < 1e-12);
    }

    #[test]
    fn test_asymmetric_rates() {
        let mut slew = SlewLimiter::with_rates(10.0, 1000.0);
        slew.set(0.5);
        let up = slew.process(0.001, 1.0);
        assert!((up - 0.51).abs() < 1e-12);
        let down = slew.process(0.001, 0.0);
        assert!((down - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_slews_each_lane() {
        // step of 0.125 per call
        let mut slew = SlewLimiter4::new(128.0);
        let dt = 1.0 / 1024.0;
        let target = GainMatrix([1.0, 0.001, -1.0, 0.0]);
        let out = slew.process(dt, target);
        assert_eq!(out.0, [0.125, 0.001, -0.125, 0.0]);
        for _ in 0..8 {
            slew.process(dt, target);
        }
        assert_eq!(slew.value(), target);
    }

    #[test]
    fn test_non_finite_target_holds() {
        let mut slew = SlewLimiter::fast();
        slew.set(0.25);
        assert_eq!(slew.process(DT, f64::NAN), 0.25);
        assert!(slew.process(DT, 1.0) > 0.25);
    }
}
