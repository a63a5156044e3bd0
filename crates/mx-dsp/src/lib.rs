//! mx-dsp: DSP building blocks for the mixing console
//!
//! Per-sample, allocation-free processing primitives.
//!
//! ## Modules
//! - `biquad` - TDF-II biquads (RBJ cookbook) with closed-form response
//! - `smoothing` - Anti-pop slew limiters (scalar and 4-wide)
//! - `fade` - Mute/fade envelope state machine
//! - `pan_law` - Stereo and mono pan laws, fast sin/cos
//! - `filters` - One-pole HPF, DC blocker, track HPF/LPF pair
//! - `clip` - Master soft/hard clipper
//! - `metering` - VU meter
//! - `eq` - 4-band track EQ (QuattroBiQuad cascade)
//! - `spectrum` - Background FFT spectrum analyzer

pub mod biquad;
pub mod smoothing;
pub mod fade;
pub mod pan_law;
pub mod filters;
pub mod clip;
pub mod metering;
pub mod eq;
pub mod spectrum;

use mx_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Stereo processor trait
pub trait StereoProcessor: Processor {
    /// Process a stereo sample pair
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample);

    /// Process stereo blocks
    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
