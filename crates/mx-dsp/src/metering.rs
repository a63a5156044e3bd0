//! Strip metering
//!
//! Stereo VU ballistics (300 ms to 99%) on the post-mute/solo signal.
//! Readers on the GUI side only need `levels()`; a torn read between the
//! two channels is harmless.

use mx_core::{Sample, StereoSample};

use crate::{Processor, ProcessorConfig};

/// Integration time of a classic VU needle (seconds)
const VU_INTEGRATION_TIME: f64 = 0.3;

/// Stereo VU meter
#[derive(Debug, Clone)]
pub struct VuMeter {
    level: [f64; 2],
    peak: [f64; 2],
    coeff: f64,
    peak_release: f64,
    sample_rate: f64,
}

impl VuMeter {
    pub fn new(sample_rate: f64) -> Self {
        let mut meter = Self {
            level: [0.0; 2],
            peak: [0.0; 2],
            coeff: 0.0,
            peak_release: 0.0,
            sample_rate,
        };
        meter.update_coeffs();
        meter
    }

    fn update_coeffs(&mut self) {
        // ~65 ms time constant reaches 99% in 300 ms
        let time_constant = VU_INTEGRATION_TIME / 4.6;
        self.coeff = 1.0 - (-1.0 / (time_constant * self.sample_rate)).exp();
        // Peak hold falls 20 dB per second
        self.peak_release = 10.0_f64.powf(-1.0 / self.sample_rate);
    }

    #[inline]
    pub fn process(&mut self, frame: StereoSample) {
        for (ch, x) in [frame.left, frame.right].into_iter().enumerate() {
            let abs = if x.is_finite() { x.abs() } else { 0.0 };
            self.level[ch] += self.coeff * (abs - self.level[ch]);
            self.peak[ch] = (self.peak[ch] * self.peak_release).max(abs);
        }
    }

    /// Averaged levels (V) as (left, right)
    #[inline]
    pub fn levels(&self) -> (Sample, Sample) {
        (self.level[0], self.level[1])
    }

    /// Held peaks (V) as (left, right)
    #[inline]
    pub fn peaks(&self) -> (Sample, Sample) {
        (self.peak[0], self.peak[1])
    }

    /// Level in dB relative to the 10V ceiling
    pub fn db(&self) -> (f64, f64) {
        let to_db = |v: f64| 20.0 * (v / mx_core::MAX_VOLTAGE).max(1e-10).log10();
        (to_db(self.level[0]), to_db(self.level[1]))
    }
}

impl Processor for VuMeter {
    fn reset(&mut self) {
        self.level = [0.0; 2];
        self.peak = [0.0; 2];
    }
}

impl ProcessorConfig for VuMeter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }
}
