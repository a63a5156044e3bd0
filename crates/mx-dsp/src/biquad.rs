//! Biquad filter implementation using Transposed Direct Form II
//!
//! Coefficients follow the RBJ audio EQ cookbook and are designed from a
//! normalized frequency (cycles per sample). The same coefficients feed both
//! the audio path and the closed-form response used for curve drawing, so
//! what is drawn is what is heard.

use mx_core::Sample;
use std::f64::consts::PI;

use crate::{MonoProcessor, Processor};

/// Biquad shapes used by the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
    Peaking,
    LowShelf,
    HighShelf,
}

/// Clamp a frequency to normalized space, never above Nyquist
#[inline]
pub fn normalized_freq(freq: f64, sample_rate: f64) -> f64 {
    (freq / sample_rate).clamp(0.0, 0.5)
}

/// Biquad coefficients (a0 normalized to 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::bypass()
    }
}

impl BiquadCoeffs {
    /// Design from a normalized frequency in [0, 0.5]
    ///
    /// `gain_db` is ignored by the pass filters.
    pub fn design(kind: BiquadKind, norm_freq: f64, q: f64, gain_db: f64) -> Self {
        let omega = 2.0 * PI * norm_freq.clamp(0.0, 0.5);
        // Keep alpha positive at DC and Nyquist so poles stay inside the unit circle
        let sin_omega = omega.sin().max(1e-6);
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q.max(1e-3));

        let (b0, b1, b2, a0, a1, a2) = match kind {
            BiquadKind::Lowpass => {
                let b1 = 1.0 - cos_omega;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
            }
            BiquadKind::Highpass => {
                let b1 = -(1.0 + cos_omega);
                (-b1 / 2.0, b1, -b1 / 2.0, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
            }
            BiquadKind::Peaking => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_omega,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_omega,
                    1.0 - alpha / a,
                )
            }
            BiquadKind::LowShelf => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_omega + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
                    a * ((a + 1.0) - (a - 1.0) * cos_omega - k),
                    (a + 1.0) + (a - 1.0) * cos_omega + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
                    (a + 1.0) + (a - 1.0) * cos_omega - k,
                )
            }
            BiquadKind::HighShelf => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_omega + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
                    a * ((a + 1.0) + (a - 1.0) * cos_omega - k),
                    (a + 1.0) - (a - 1.0) * cos_omega + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
                    (a + 1.0) - (a - 1.0) * cos_omega - k,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        Self::design(BiquadKind::Lowpass, normalized_freq(freq, sample_rate), q, 0.0)
    }

    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        Self::design(BiquadKind::Highpass, normalized_freq(freq, sample_rate), q, 0.0)
    }

    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::design(BiquadKind::Peaking, normalized_freq(freq, sample_rate), q, gain_db)
    }

    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::design(BiquadKind::LowShelf, normalized_freq(freq, sample_rate), q, gain_db)
    }

    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::design(BiquadKind::HighShelf, normalized_freq(freq, sample_rate), q, gain_db)
    }

    /// Bypass (unity gain, no filtering)
    pub const fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Closed-form response at a normalized frequency
    ///
    /// Evaluates H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
    /// at z = e^(jω). Returns (magnitude, phase).
    pub fn response(&self, norm_freq: f64) -> (f64, f64) {
        let omega = 2.0 * PI * norm_freq;
        let (sin_w, cos_w) = omega.sin_cos();
        let (sin_2w, cos_2w) = (2.0 * omega).sin_cos();

        let num_re = self.b0 + self.b1 * cos_w + self.b2 * cos_2w;
        let num_im = -self.b1 * sin_w - self.b2 * sin_2w;
        let den_re = 1.0 + self.a1 * cos_w + self.a2 * cos_2w;
        let den_im = -self.a1 * sin_w - self.a2 * sin_2w;

        let den_mag_sq = (den_re * den_re + den_im * den_im).max(1e-300);
        let h_re = (num_re * den_re + num_im * den_im) / den_mag_sq;
        let h_im = (num_im * den_re - num_re * den_im) / den_mag_sq;

        ((h_re * h_re + h_im * h_im).sqrt(), h_im.atan2(h_re))
    }

    /// Magnitude response in dB at a normalized frequency
    #[inline]
    pub fn magnitude_db(&self, norm_freq: f64) -> f64 {
        20.0 * self.response(norm_freq).0.max(1e-12).log10()
    }
}

/// Single-channel TDF-II biquad
#[derive(Debug, Clone, Default)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl BiquadTDF2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coeffs(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }
}

impl Processor for BiquadTDF2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTDF2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_bypass() {
        let mut filter = BiquadTDF2::new();
        let output = filter.process_sample(0.5);
        assert!((output - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lowpass_dc() {
        let mut filter = BiquadTDF2::with_coeffs(BiquadCoeffs::lowpass(1000.0, 0.707, SR));
        for _ in 0..2000 {
            filter.process_sample(1.0);
        }
        assert!((filter.process_sample(1.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_highpass_dc() {
        let mut filter = BiquadTDF2::with_coeffs(BiquadCoeffs::highpass(1000.0, 0.707, SR));
        for _ in 0..2000 {
            filter.process_sample(1.0);
        }
        assert!(filter.process_sample(1.0).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let mut filter = BiquadTDF2::with_coeffs(BiquadCoeffs::lowpass(1000.0, 0.707, SR));
        for _ in 0..100 {
            filter.process_sample(1.0);
        }
        filter.reset();
        assert_eq!(filter.z1, 0.0);
        assert_eq!(filter.z2, 0.0);
    }

    #[test]
    fn test_peaking_response_at_center() {
        let c = BiquadCoeffs::peaking(1000.0, 1.0, 6.0, SR);
        assert!((c.magnitude_db(1000.0 / SR) - 6.0).abs() < 1e-6);
        // Far away from the bell the response is flat
        assert!(c.magnitude_db(20.0 / SR).abs() < 0.05);
    }

    #[test]
    fn test_shelf_asymptotes() {
        let low = BiquadCoeffs::low_shelf(200.0, 0.707, -9.0, SR);
        assert!((low.magnitude_db(10.0 / SR) + 9.0).abs() < 0.1);
        assert!(low.magnitude_db(15000.0 / SR).abs() < 0.1);

        let high = BiquadCoeffs::high_shelf(4000.0, 0.707, 9.0, SR);
        assert!((high.magnitude_db(0.49) - 9.0).abs() < 0.2);
        assert!(high.magnitude_db(30.0 / SR).abs() < 0.1);
    }

    #[test]
    fn test_frequency_clamped_at_nyquist() {
        assert_eq!(normalized_freq(30000.0, 44100.0), 0.5);
        let c = BiquadCoeffs::peaking(30000.0, 1.0, 12.0, 44100.0);
        assert!(c.b0.is_finite() && c.a1.is_finite() && c.a2.is_finite());
        // Poles inside the unit circle
        assert!(c.a2.abs() < 1.0);
    }
}
