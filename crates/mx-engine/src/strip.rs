//! Pieces shared by every strip
//!
//! The back half of a strip (pan/fader matrix, mute/solo/fade gate and VU)
//! is the same for tracks, groups and aux returns and lives in `GainStage`.
//! The four taps are stored in signal-flow order:
//!
//! ```text
//! [0] pre-insert   [1] pre-fader   [2] post-fader   [3] post-mute/solo
//! ```

use mx_core::{clamp20v, MonoPanLaw, N_TAPS, StereoPanLaw, StereoSample, Tap, MAX_VOLTAGE};
use mx_dsp::fade::FadeGain;
use mx_dsp::metering::VuMeter;
use mx_dsp::pan_law::{fader_gain, pan_matrix, GainMatrix, MAX_FADER};
use mx_dsp::smoothing::{SlewLimiter, SlewLimiter4};
use mx_dsp::Processor;

pub type Taps = [StereoSample; N_TAPS];

/// CV above this (V) counts as a gate
pub const CV_GATE_THRESHOLD: f64 = 1.0;

#[inline]
pub fn tap(taps: &Taps, which: Tap) -> StereoSample {
    taps[which.index()]
}

// ============ Controls ============

/// Front-panel controls of a strip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripControls {
    /// Fader knob in [0, MAX_FADER]; gain is knob³
    pub fader: f64,
    /// 0 = left, 0.5 = center, 1 = right
    pub pan: f64,
    pub mute: bool,
    pub solo: bool,
}

impl Default for StripControls {
    fn default() -> Self {
        Self {
            fader: 1.0,
            pan: 0.5,
            mute: false,
            solo: false,
        }
    }
}

/// CV inputs of a strip; `None` means unpatched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StripCv {
    pub vol: Option<f64>,
    pub pan: Option<f64>,
    pub mute: Option<f64>,
    pub solo: Option<f64>,
}

impl StripControls {
    /// Fader knob after volume CV (0..10V scales the knob by 0..1)
    #[inline]
    pub fn effective_fader(&self, cv: &StripCv) -> f64 {
        let fader = if self.fader.is_finite() { self.fader.clamp(0.0, MAX_FADER) } else { 0.0 };
        match cv.vol {
            Some(v) => fader * (clamp20v(v) / MAX_VOLTAGE).clamp(0.0, 1.0),
            None => fader,
        }
    }

    /// Pan after pan CV (±5V sweeps the full width)
    #[inline]
    pub fn effective_pan(&self, cv: &StripCv) -> f64 {
        let pan = if self.pan.is_finite() { self.pan } else { 0.5 };
        let offset = cv.pan.map_or(0.0, |v| clamp20v(v) / MAX_VOLTAGE);
        (pan + offset).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn effective_mute(&self, cv: &StripCv) -> bool {
        self.mute || cv.mute.is_some_and(|v| v > CV_GATE_THRESHOLD)
    }

    #[inline]
    pub fn effective_solo(&self, cv: &StripCv) -> bool {
        self.solo || cv.solo.is_some_and(|v| v > CV_GATE_THRESHOLD)
    }

    /// Pan and fader as one gain matrix
    pub fn gain_matrix(&self, cv: &StripCv, stereo: bool, stereo_law: StereoPanLaw, mono_law: MonoPanLaw) -> GainMatrix {
        pan_matrix(self.effective_pan(cv), stereo, stereo_law, mono_law)
            .scaled(fader_gain(self.effective_fader(cv)))
    }
}

/// Mute/fade envelope settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSettings {
    /// Fade time in seconds; below `MIN_FADE_RATE` mute is a plain cut
    pub rate: f64,
    /// -1 log, 0 linear, +1 exponential
    pub profile: f64,
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self {
            rate: 0.0,
            profile: 0.0,
        }
    }
}

// ============ Gain stage ============

/// Pan/fader matrix, mute/solo/fade gate and VU
#[derive(Debug, Clone)]
pub struct GainStage {
    matrix_slew: SlewLimiter4,
    gate_slew: SlewLimiter,
    fade: FadeGain,
    vu: VuMeter,
    matrix_target: GainMatrix,
    gate_target: f64,
}

impl GainStage {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            matrix_slew: SlewLimiter4::slow(),
            gate_slew: SlewLimiter::fast(),
            fade: FadeGain::new(),
            vu: VuMeter::new(sample_rate),
            matrix_target: GainMatrix::UNITY,
            gate_target: 1.0,
        }
    }

    pub fn reset(&mut self) {
        self.matrix_slew.reset();
        self.gate_slew.reset();
        self.fade.reset();
        self.vu.reset();
        self.matrix_target = GainMatrix::UNITY;
        self.gate_target = 1.0;
    }

    /// New targets, computed on eco ticks; `dt` is the time since the last one
    pub fn update_targets(
        &mut self,
        matrix: GainMatrix,
        mute: bool,
        solo_gate: f64,
        fade: &FadeSettings,
        symmetrical: bool,
        dt: f64,
    ) {
        self.matrix_target = matrix;
        let fade_gain = self.fade.process(
            if mute { 0.0 } else { 1.0 },
            fade.rate,
            fade.profile,
            symmetrical,
            dt,
        );
        self.gate_target = fade_gain * solo_gate;
    }

    /// Jump the slewers to their targets
    pub fn prime(&mut self) {
        self.matrix_slew.set(self.matrix_target);
        self.gate_slew.set(self.gate_target);
    }

    /// Returns (post-fader, post-mute/solo)
    #[inline]
    pub fn process(&mut self, input: StereoSample, dt: f64, cloaked: bool) -> (StereoSample, StereoSample) {
        let post_fader = self.matrix_slew.process(dt, self.matrix_target).apply(input);
        let post = post_fader * self.gate_slew.process(dt, self.gate_target);
        if cloaked {
            self.vu.reset();
        } else {
            self.vu.process(post);
        }
        (post_fader, post)
    }

    #[inline]
    pub fn vu(&self) -> &VuMeter {
        &self.vu
    }

    /// Current mute/fade envelope (0..1)
    #[inline]
    pub fn fade_gain(&self) -> f64 {
        self.fade.gain()
    }

    /// Current slewed mute/solo/fade gate
    #[inline]
    pub fn gate(&self) -> f64 {
        self.gate_slew.value()
    }

    #[inline]
    pub fn matrix(&self) -> GainMatrix {
        self.matrix_slew.value()
    }
}
