//! Master bus
//!
//! mix + chain input → fader/dim/mono matrix → mute fade → DC blocker →
//! clipper → VU. The output always goes through the clipper.

use mx_core::{clamp20v, db_to_linear, linear_to_db, ClipMode, StereoSample, MAX_VOLTAGE};
use mx_dsp::clip::clip_stereo;
use mx_dsp::fade::FadeGain;
use mx_dsp::filters::OnePoleHpf;
use mx_dsp::metering::VuMeter;
use mx_dsp::pan_law::{fader_gain, GainMatrix, MAX_FADER};
use mx_dsp::smoothing::{SlewLimiter, SlewLimiter4};
use mx_dsp::{MonoProcessor, Processor};

use crate::global_info::GlobalInfo;
use crate::refresh::RefreshTick;
use crate::strip::{FadeSettings, CV_GATE_THRESHOLD};

/// Default dim level (-20 dB)
pub const DEFAULT_DIM_GAIN: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterControls {
    pub fader: f64,
    pub mute: bool,
    pub dim: bool,
    pub mono: bool,
}

impl Default for MasterControls {
    fn default() -> Self {
        Self {
            fader: 1.0,
            mute: false,
            dim: false,
            mono: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterSettings {
    pub fade: FadeSettings,
    /// Linear; applied rounded to the nearest dB
    pub dim_gain: f64,
    pub dc_block: bool,
    pub clipping: ClipMode,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            fade: FadeSettings::default(),
            dim_gain: DEFAULT_DIM_GAIN,
            dc_block: true,
            clipping: ClipMode::Soft,
        }
    }
}

/// Host inputs of the master for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MasterInput {
    pub vol_cv: Option<f64>,
    pub mute_cv: Option<f64>,
    /// Mix from a chained mixer
    pub chain: Option<StereoSample>,
}

#[derive(Debug, Clone)]
pub struct Master {
    pub controls: MasterControls,
    pub settings: MasterSettings,
    matrix_slew: SlewLimiter4,
    gate_slew: SlewLimiter,
    chain_slew: SlewLimiter,
    fade: FadeGain,
    dc_blockers: [OnePoleHpf; 2],
    vu: VuMeter,
    dim_cache: Option<(i32, f64)>,
    matrix_target: GainMatrix,
    gate_target: f64,
    output: StereoSample,
    primed: bool,
}

impl Master {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            controls: MasterControls::default(),
            settings: MasterSettings::default(),
            matrix_slew: SlewLimiter4::slow(),
            gate_slew: SlewLimiter::fast(),
            chain_slew: SlewLimiter::fast(),
            fade: FadeGain::new(),
            dc_blockers: [OnePoleHpf::dc_blocker(sample_rate), OnePoleHpf::dc_blocker(sample_rate)],
            vu: VuMeter::new(sample_rate),
            dim_cache: None,
            matrix_target: GainMatrix::UNITY,
            gate_target: 1.0,
            output: StereoSample::ZERO,
            primed: false,
        }
    }

    pub fn reset(&mut self) {
        self.controls = MasterControls::default();
        self.settings = MasterSettings::default();
        self.clear_runtime();
    }

    pub fn clear_runtime(&mut self) {
        self.matrix_slew.reset();
        self.gate_slew.reset();
        self.chain_slew.reset();
        self.fade.reset();
        for dc in self.dc_blockers.iter_mut() {
            dc.reset();
        }
        self.vu.reset();
        self.dim_cache = None;
        self.matrix_target = GainMatrix::UNITY;
        self.gate_target = 1.0;
        self.output = StereoSample::ZERO;
        self.primed = false;
    }

    /// Dim gain rounded to whole dB, recomputed only when the dB value moves
    fn dim_linear(&mut self) -> f64 {
        let db = linear_to_db(self.settings.dim_gain.clamp(0.0, 1.0)).max(-120.0).round() as i32;
        match self.dim_cache {
            Some((cached, lin)) if cached == db => lin,
            _ => {
                let lin = db_to_linear(db as f64);
                self.dim_cache = Some((db, lin));
                lin
            }
        }
    }

    fn effective_fader(&self, input: &MasterInput) -> f64 {
        let fader = if self.controls.fader.is_finite() { self.controls.fader.clamp(0.0, MAX_FADER) } else { 0.0 };
        match input.vol_cv {
            Some(v) => fader * (clamp20v(v) / MAX_VOLTAGE).clamp(0.0, 1.0),
            None => fader,
        }
    }

    pub fn process(
        &mut self,
        mix: StereoSample,
        input: &MasterInput,
        gi: &GlobalInfo,
        tick: &RefreshTick,
        sample_time: f64,
    ) -> StereoSample {
        let chain_gain = self
            .chain_slew
            .process(sample_time, if input.chain.is_some() { 1.0 } else { 0.0 });
        let chain = input.chain.map_or(StereoSample::ZERO, StereoSample::sanitized);
        let mix = mix + chain * chain_gain;

        if tick.eco || !self.primed {
            let mut gain = fader_gain(self.effective_fader(input));
            if self.controls.dim {
                gain *= self.dim_linear();
            }
            let shape = if self.controls.mono { GainMatrix::MONO } else { GainMatrix::UNITY };
            self.matrix_target = shape.scaled(gain);

            let mute = self.controls.mute || input.mute_cv.is_some_and(|v| v > CV_GATE_THRESHOLD);
            let dt = if self.primed { tick.eco_dt(sample_time) } else { sample_time };
            self.gate_target = self.fade.process(
                if mute { 0.0 } else { 1.0 },
                self.settings.fade.rate,
                self.settings.fade.profile,
                gi.symmetrical_fade,
                dt,
            );
            if !self.primed {
                self.matrix_slew.set(self.matrix_target);
                self.gate_slew.set(self.gate_target);
                self.primed = true;
            }
        }

        let matrix = self.matrix_slew.process(sample_time, self.matrix_target);
        let mut x = matrix.apply(mix) * self.gate_slew.process(sample_time, self.gate_target);

        if self.settings.dc_block {
            x = StereoSample::new(
                self.dc_blockers[0].process_sample(x.left),
                self.dc_blockers[1].process_sample(x.right),
            );
        }
        x = clip_stereo(x, self.settings.clipping);

        if gi.cloaked {
            self.vu.reset();
        } else {
            self.vu.process(x);
        }
        self.output = x;
        x
    }

    #[inline]
    pub fn output(&self) -> StereoSample {
        self.output
    }

    #[inline]
    pub fn vu(&self) -> &VuMeter {
        &self.vu
    }
}
