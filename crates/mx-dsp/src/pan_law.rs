//! Pan laws and the strip gain matrix
//!
//! A `GainMatrix` is `[L, R, RinL, LinR]`:
//!
//! ```text
//! out_l = in_l * L + in_r * RinL
//! out_r = in_r * R + in_l * LinR
//! ```
//!
//! Pan is in [0, 1] with 0.5 at center. Center always yields exact unity
//! with no crosstalk, whatever the law.

use mx_core::{MonoPanLaw, Sample, StereoPanLaw, StereoSample};
use std::f64::consts::{FRAC_PI_2, PI, SQRT_2};

/// Top of the fader knob: knob³ = 2 (+6 dB)
pub const MAX_FADER: f64 = 1.259_921_049_894_873_2;
/// Fader taper exponent
pub const FADER_SCALING_EXPONENT: i32 = 3;

/// 4-wide strip gain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainMatrix(pub [f64; 4]);

impl Default for GainMatrix {
    fn default() -> Self {
        Self::UNITY
    }
}

impl GainMatrix {
    pub const ZERO: Self = Self([0.0; 4]);
    pub const UNITY: Self = Self([1.0, 1.0, 0.0, 0.0]);
    /// Mono downmix: each side gets half of both
    pub const MONO: Self = Self([0.5, 0.5, 0.5, 0.5]);

    #[inline]
    pub fn scaled(self, gain: f64) -> Self {
        let [l, r, rl, lr] = self.0;
        Self([l * gain, r * gain, rl * gain, lr * gain])
    }

    #[inline]
    pub fn apply(&self, input: StereoSample) -> StereoSample {
        let [l, r, r_in_l, l_in_r] = self.0;
        StereoSample::new(
            input.left * l + input.right * r_in_l,
            input.right * r + input.left * l_in_r,
        )
    }
}

// ============ Fast trig ============

/// sin(x) for 0 ≤ x ≤ π/2, 5th-order MacLaurin series
#[inline]
pub fn sin_fast(x: f64) -> f64 {
    let x2 = x * x;
    x * (1.0 - x2 / 6.0 * (1.0 - x2 / 20.0))
}

/// cos(x) for 0 ≤ x ≤ π/2, via the complementary angle
#[inline]
pub fn cos_fast(x: f64) -> f64 {
    sin_fast(FRAC_PI_2 - x)
}

// ============ Laws ============

#[inline]
fn balance(pan: f64) -> (f64, f64) {
    ((2.0 - 2.0 * pan).min(1.0), (2.0 * pan).min(1.0))
}

#[inline]
fn equal_power(pan: f64) -> (f64, f64) {
    let theta = pan * FRAC_PI_2;
    (cos_fast(theta) * SQRT_2, sin_fast(theta) * SQRT_2)
}

#[inline]
fn linear_6db(pan: f64) -> (f64, f64) {
    (2.0 - 2.0 * pan, 2.0 * pan)
}

/// Gain matrix for a stereo source
pub fn stereo_pan(pan: f64, law: StereoPanLaw) -> GainMatrix {
    let pan = sanitize_pan(pan);
    if pan == 0.5 {
        return GainMatrix::UNITY;
    }
    match law {
        StereoPanLaw::Balance => {
            let (l, r) = balance(pan);
            GainMatrix([l, r, 0.0, 0.0])
        }
        StereoPanLaw::EqualPower => {
            let (l, r) = equal_power(pan);
            GainMatrix([l, r, 0.0, 0.0])
        }
        StereoPanLaw::TruePan => {
            if pan < 0.5 {
                let theta = pan * PI;
                GainMatrix([1.0, sin_fast(theta), cos_fast(theta), 0.0])
            } else {
                let theta = (1.0 - pan) * PI;
                GainMatrix([sin_fast(theta), 1.0, 0.0, cos_fast(theta)])
            }
        }
    }
}

/// Gain matrix for a mono source (left input copied to both sides)
pub fn mono_pan(pan: f64, law: MonoPanLaw) -> GainMatrix {
    let pan = sanitize_pan(pan);
    if pan == 0.5 {
        return GainMatrix::UNITY;
    }
    let (l, r) = match law {
        MonoPanLaw::Plus0Db => balance(pan),
        MonoPanLaw::Plus3Db => equal_power(pan),
        MonoPanLaw::Plus4p5Db => {
            let (el, er) = equal_power(pan);
            let (ll, lr) = linear_6db(pan);
            ((el * ll).sqrt(), (er * lr).sqrt())
        }
        MonoPanLaw::Plus6Db => linear_6db(pan),
    };
    GainMatrix([l, r, 0.0, 0.0])
}

/// Pan matrix for a source of either width
#[inline]
pub fn pan_matrix(pan: f64, stereo: bool, stereo_law: StereoPanLaw, mono_law: MonoPanLaw) -> GainMatrix {
    if stereo {
        stereo_pan(pan, stereo_law)
    } else {
        mono_pan(pan, mono_law)
    }
}

/// Cubic fader taper
#[inline]
pub fn fader_gain(knob: f64) -> Sample {
    let knob = if knob.is_finite() { knob.clamp(0.0, MAX_FADER) } else { 0.0 };
    knob.powi(FADER_SCALING_EXPONENT)
}

/// Knob position that gives a linear gain
#[inline]
pub fn fader_knob_for_gain(gain: f64) -> f64 {
    gain.max(0.0).cbrt().min(MAX_FADER)
}

#[inline]
fn sanitize_pan(pan: f64) -> f64 {
    if pan.is_finite() { pan.clamp(0.0, 1.0) } else { 0.5 }
}
