//! Strip filters
//!
//! - `OnePoleHpf` - 6 dB/oct highpass, also used as the master DC blocker
//! - `TrackFilters` - stereo HPF (one-pole + biquad, 18 dB/oct) and LPF
//!   (biquad, 12 dB/oct) with off positions at the ends of their ranges

use mx_core::{Sample, StereoSample};
use std::f64::consts::PI;

use crate::biquad::{BiquadCoeffs, BiquadTDF2};
use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Bottom of the HPF knob, which reads "off" (Hz)
pub const HPF_MIN_CUTOFF: f64 = 10.0;
/// HPF cutoffs below this are off (Hz)
pub const HPF_OFF_BELOW: f64 = 13.0;
/// LPF cutoffs at or above this are off (Hz)
pub const LPF_OFF_AT: f64 = 20000.0;
/// Master DC blocker corner (Hz)
pub const DC_BLOCK_FREQ: f64 = 10.0;

const HPF_BIQUAD_Q: f64 = 1.0;
const LPF_BIQUAD_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

// ============ One-pole ============

/// One-pole highpass: subtracts a one-pole lowpass from the input
#[derive(Debug, Clone)]
pub struct OnePoleHpf {
    coeff: f64,
    lp: f64,
    cutoff: f64,
    sample_rate: f64,
}

impl OnePoleHpf {
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let mut hpf = Self {
            coeff: 0.0,
            lp: 0.0,
            cutoff,
            sample_rate,
        };
        hpf.update_coeff();
        hpf
    }

    /// DC blocker at `DC_BLOCK_FREQ`
    pub fn dc_blocker(sample_rate: f64) -> Self {
        Self::new(DC_BLOCK_FREQ, sample_rate)
    }

    pub fn set_cutoff(&mut self, cutoff: f64) {
        if cutoff != self.cutoff {
            self.cutoff = cutoff;
            self.update_coeff();
        }
    }

    #[inline]
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn update_coeff(&mut self) {
        let fc = self.cutoff.clamp(0.0, self.sample_rate * 0.49);
        self.coeff = 1.0 - (-2.0 * PI * fc / self.sample_rate).exp();
    }
}

impl Processor for OnePoleHpf {
    fn reset(&mut self) {
        self.lp = 0.0;
    }
}

impl MonoProcessor for OnePoleHpf {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.lp += self.coeff * (input - self.lp);
        input - self.lp
    }
}

impl ProcessorConfig for OnePoleHpf {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeff();
    }
}

// ============ Track HPF/LPF ============

#[derive(Debug, Clone)]
pub struct TrackFilters {
    hpf_cutoff: f64,
    lpf_cutoff: f64,
    sample_rate: f64,
    hpf_pre: [OnePoleHpf; 2],
    hpf: [BiquadTDF2; 2],
    lpf: [BiquadTDF2; 2],
}

impl TrackFilters {
    /// Both filters start off
    pub fn new(sample_rate: f64) -> Self {
        let mut filters = Self {
            hpf_cutoff: HPF_MIN_CUTOFF,
            lpf_cutoff: LPF_OFF_AT,
            sample_rate,
            hpf_pre: [
                OnePoleHpf::new(HPF_MIN_CUTOFF, sample_rate),
                OnePoleHpf::new(HPF_MIN_CUTOFF, sample_rate),
            ],
            hpf: [BiquadTDF2::new(), BiquadTDF2::new()],
            lpf: [BiquadTDF2::new(), BiquadTDF2::new()],
        };
        filters.update_hpf();
        filters.update_lpf();
        filters
    }

    pub fn set_hpf_cutoff(&mut self, cutoff: f64) {
        if cutoff.is_finite() && cutoff != self.hpf_cutoff {
            self.hpf_cutoff = cutoff;
            self.update_hpf();
        }
    }

    pub fn set_lpf_cutoff(&mut self, cutoff: f64) {
        if cutoff.is_finite() && cutoff != self.lpf_cutoff {
            self.lpf_cutoff = cutoff;
            self.update_lpf();
        }
    }

    #[inline]
    pub fn hpf_cutoff(&self) -> f64 {
        self.hpf_cutoff
    }

    #[inline]
    pub fn lpf_cutoff(&self) -> f64 {
        self.lpf_cutoff
    }

    #[inline]
    pub fn hpf_active(&self) -> bool {
        self.hpf_cutoff >= HPF_OFF_BELOW
    }

    #[inline]
    pub fn lpf_active(&self) -> bool {
        self.lpf_cutoff < LPF_OFF_AT
    }

    fn update_hpf(&mut self) {
        let coeffs = BiquadCoeffs::highpass(self.hpf_cutoff, HPF_BIQUAD_Q, self.sample_rate);
        for (pre, bq) in self.hpf_pre.iter_mut().zip(self.hpf.iter_mut()) {
            pre.set_cutoff(self.hpf_cutoff);
            bq.set_coeffs(coeffs);
        }
    }

    fn update_lpf(&mut self) {
        let coeffs = BiquadCoeffs::lowpass(self.lpf_cutoff, LPF_BIQUAD_Q, self.sample_rate);
        for bq in self.lpf.iter_mut() {
            bq.set_coeffs(coeffs);
        }
    }

    #[inline]
    fn process_channel(&mut self, ch: usize, mut x: Sample) -> Sample {
        if self.hpf_active() {
            x = self.hpf_pre[ch].process_sample(x);
            x = self.hpf[ch].process_sample(x);
        }
        if self.lpf_active() {
            x = self.lpf[ch].process_sample(x);
        }
        x
    }

    /// Filter a frame; mono frames run the left filters only
    #[inline]
    pub fn process(&mut self, input: StereoSample, stereo: bool) -> StereoSample {
        if !self.hpf_active() && !self.lpf_active() {
            return input;
        }
        let left = self.process_channel(0, input.left);
        if stereo {
            StereoSample::new(left, self.process_channel(1, input.right))
        } else {
            StereoSample::mono(left)
        }
    }
}

impl Processor for TrackFilters {
    fn reset(&mut self) {
        for f in self.hpf_pre.iter_mut() {
            f.reset();
        }
        for f in self.hpf.iter_mut().chain(self.lpf.iter_mut()) {
            f.reset();
        }
    }
}

impl ProcessorConfig for TrackFilters {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for f in self.hpf_pre.iter_mut() {
            f.set_sample_rate(sample_rate);
        }
        self.update_hpf();
        self.update_lpf();
    }
}
