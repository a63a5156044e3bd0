//! Aux expander
//!
//! Sits next to a mixer and talks to it only through the message bus. It
//! receives the summed aux sends (and hands them to its send outputs), runs
//! the four aux return strips, and reports back the processed returns, its
//! aux solo mask and the send knobs.
//!
//! Aux returns solo among themselves; their solo bits are refreshed on
//! scheduler slots 20..23. Pan laws, fade symmetry and cloaked mode are the
//! mixer's and arrive with every message.

use mx_core::{EngineConfig, MxResult, N_AUX, N_GRP, N_SOLO, N_TRK, StereoPanLaw, StereoSample};
use mx_dsp::metering::VuMeter;
use serde_json::Value;

use crate::expansion::{AuxToMother, MotherToAux, N_BUS_LABELS};
use crate::global_info::aux_solo_gate;
use crate::persist::{key, parse_object, JsonReader, JsonWriter};
use crate::refresh::{RefreshScheduler, RefreshTick};
use crate::strip::{FadeSettings, GainStage, StripControls, StripCv};
use crate::survey::{Label, MixerLabels};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxSettings {
    pub fade: FadeSettings,
    pub pan_law_stereo: StereoPanLaw,
}

impl Default for AuxSettings {
    fn default() -> Self {
        Self {
            fade: FadeSettings::default(),
            pan_law_stereo: StereoPanLaw::Balance,
        }
    }
}

/// Host inputs of one aux return for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuxInput {
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub cv: StripCv,
}

impl AuxInput {
    pub fn stereo(l: f64, r: f64) -> Self {
        Self {
            left: Some(l),
            right: Some(r),
            cv: StripCv::default(),
        }
    }
}

// ============ Aux return strip ============

#[derive(Debug, Clone)]
pub struct AuxStrip {
    index: usize,
    pub controls: StripControls,
    pub settings: AuxSettings,
    stage: GainStage,
    output: StereoSample,
    in_use: bool,
    primed: bool,
}

impl AuxStrip {
    pub fn new(index: usize, sample_rate: f64) -> Self {
        Self {
            index,
            controls: StripControls::default(),
            settings: AuxSettings::default(),
            stage: GainStage::new(sample_rate),
            output: StereoSample::ZERO,
            in_use: false,
            primed: false,
        }
    }

    pub fn reset(&mut self) {
        self.controls = StripControls::default();
        self.settings = AuxSettings::default();
        self.clear_runtime();
    }

    pub fn clear_runtime(&mut self) {
        self.stage.reset();
        self.output = StereoSample::ZERO;
        self.in_use = false;
        self.primed = false;
    }

    /// `mixer` supplies the mixer-wide settings
    pub fn process(
        &mut self,
        input: &AuxInput,
        solo_gate: f64,
        mixer: &MotherToAux,
        tick: &RefreshTick,
        sample_time: f64,
    ) -> StereoSample {
        let Some(left) = input.left else {
            if self.in_use || self.primed {
                self.clear_runtime();
            }
            return StereoSample::ZERO;
        };
        self.in_use = true;
        let stereo = input.right.is_some();
        let x = StereoSample::new(left, input.right.unwrap_or(left)).sanitized();

        if tick.eco || !self.primed {
            let cv = &input.cv;
            let law = mixer.pan_law_stereo.resolve(self.settings.pan_law_stereo);
            let matrix = self.controls.gain_matrix(cv, stereo, law, mixer.pan_law_mono);
            let dt = if self.primed { tick.eco_dt(sample_time) } else { sample_time };
            self.stage.update_targets(
                matrix,
                self.controls.effective_mute(cv),
                solo_gate,
                &self.settings.fade,
                mixer.symmetrical_fade,
                dt,
            );
            if !self.primed {
                self.stage.prime();
                self.primed = true;
            }
        }

        let (_, post) = self.stage.process(x, sample_time, mixer.cloaked);
        self.output = post;
        post
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn output(&self) -> StereoSample {
        self.output
    }

    #[inline]
    pub fn vu(&self) -> &VuMeter {
        self.stage.vu()
    }
}

// ============ Expander ============

#[derive(Debug, Clone)]
pub struct AuxExpander {
    pub strips: [AuxStrip; N_AUX],
    /// Send knob per track/group (rows) and aux (columns), in [0, 1]
    pub send_levels: [[f64; N_AUX]; N_SOLO],
    pub send_mutes: [bool; N_AUX],
    aux_solo_mask: u32,
    labels: [Label; N_BUS_LABELS],
    scheduler: RefreshScheduler,
    sample_time: f64,
}

impl AuxExpander {
    pub fn new(config: &EngineConfig) -> MxResult<Self> {
        config.validate()?;
        let sr = config.sample_rate;
        Ok(Self {
            strips: std::array::from_fn(|a| AuxStrip::new(a, sr)),
            send_levels: [[0.0; N_AUX]; N_SOLO],
            send_mutes: [false; N_AUX],
            aux_solo_mask: 0,
            labels: default_labels(),
            scheduler: RefreshScheduler::new(config.eco_stride),
            sample_time: config.sample_time(),
        })
    }

    /// Defaults everywhere, runtime state cleared
    pub fn reset(&mut self) {
        for strip in self.strips.iter_mut() {
            strip.reset();
        }
        self.send_levels = [[0.0; N_AUX]; N_SOLO];
        self.send_mutes = [false; N_AUX];
        self.aux_solo_mask = 0;
        self.labels = default_labels();
        self.scheduler.reset();
    }

    /// One sample. Returns the aux send outputs.
    pub fn process(
        &mut self,
        inputs: &[AuxInput; N_AUX],
        from_mother: &MotherToAux,
        to_mother: &mut AuxToMother,
    ) -> [StereoSample; N_AUX] {
        let tick = self.scheduler.tick();
        if let Some(a) = tick.aux_index() {
            let soloed = self.strips[a].controls.effective_solo(&inputs[a].cv);
            if soloed {
                self.aux_solo_mask |= 1 << a;
            } else {
                self.aux_solo_mask &= !(1 << a);
            }
        }
        if from_mother.update_labels {
            self.labels = from_mother.labels;
        }

        for (a, strip) in self.strips.iter_mut().enumerate() {
            let gate = aux_solo_gate(
                a,
                self.aux_solo_mask,
                from_mother.track_solo_active,
                from_mother.mute_aux_when_track_solo,
            );
            to_mother.aux_returns[a] = strip.process(&inputs[a], gate, from_mother, &tick, self.sample_time);
        }
        to_mother.aux_solo_mask = self.aux_solo_mask;
        to_mother.send_levels = self.send_levels;
        to_mother.send_mutes = self.send_mutes;

        from_mother.aux_sends
    }

    #[inline]
    pub fn aux_solo_mask(&self) -> u32 {
        self.aux_solo_mask
    }

    /// Labels last received from the mixer (tracks, groups, aux)
    pub fn labels(&self) -> &[Label; N_BUS_LABELS] {
        &self.labels
    }

    // ============ Persistence ============

    pub fn data_to_json(&self) -> Value {
        let mut w = JsonWriter::new();
        for (a, strip) in self.strips.iter().enumerate() {
            w.f64(key("a", a, "fader"), strip.controls.fader);
            w.f64(key("a", a, "pan"), strip.controls.pan);
            w.bool(key("a", a, "mute"), strip.controls.mute);
            w.bool(key("a", a, "solo"), strip.controls.solo);
            w.f64(key("a", a, "fadeRate"), strip.settings.fade.rate);
            w.f64(key("a", a, "fadeProfile"), strip.settings.fade.profile);
            w.int(key("a", a, "panLawStereo"), strip.settings.pan_law_stereo.index() as i64);
            w.bool(key("a", a, "sendMute"), self.send_mutes[a]);
        }
        for (i, levels) in self.send_levels.iter().enumerate() {
            let (prefix, n) = send_owner(i);
            for (a, &level) in levels.iter().enumerate() {
                w.f64(key(prefix, n, &format!("send{a}")), level);
            }
        }
        w.finish()
    }

    pub fn data_from_json(&mut self, value: &Value) {
        self.reset();
        let r = JsonReader::new(value);
        for (a, strip) in self.strips.iter_mut().enumerate() {
            r.f64(&key("a", a, "fader"), &mut strip.controls.fader);
            r.f64(&key("a", a, "pan"), &mut strip.controls.pan);
            r.bool(&key("a", a, "mute"), &mut strip.controls.mute);
            r.bool(&key("a", a, "solo"), &mut strip.controls.solo);
            r.f64(&key("a", a, "fadeRate"), &mut strip.settings.fade.rate);
            r.f64(&key("a", a, "fadeProfile"), &mut strip.settings.fade.profile);
            r.index(&key("a", a, "panLawStereo"), &mut strip.settings.pan_law_stereo, StereoPanLaw::from_index);
            r.bool(&key("a", a, "sendMute"), &mut self.send_mutes[a]);
        }
        for (i, levels) in self.send_levels.iter_mut().enumerate() {
            let (prefix, n) = send_owner(i);
            for (a, level) in levels.iter_mut().enumerate() {
                r.f64(&key(prefix, n, &format!("send{a}")), level);
                *level = level.clamp(0.0, 1.0);
            }
        }
    }

    pub fn to_json_string(&self) -> MxResult<String> {
        Ok(serde_json::to_string(&self.data_to_json())?)
    }

    pub fn from_json_str(&mut self, json: &str) -> MxResult<()> {
        let value = parse_object(json)?;
        self.data_from_json(&value);
        Ok(())
    }
}

fn default_labels() -> [Label; N_BUS_LABELS] {
    let mut labels = [Label::BLANK; N_BUS_LABELS];
    for (dst, src) in labels.iter_mut().zip(MixerLabels::default().flat()) {
        *dst = src;
    }
    labels
}

/// Entity prefix and index of a send row
fn send_owner(row: usize) -> (&'static str, usize) {
    if row < N_TRK {
        ("t", row)
    } else {
        debug_assert!(row < N_TRK + N_GRP);
        ("g", row - N_TRK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::StereoPanMode;

    fn expander() -> AuxExpander {
        AuxExpander::new(&EngineConfig::default()).unwrap()
    }

    fn run(exp: &mut AuxExpander, inputs: &[AuxInput; N_AUX], msg: &MotherToAux, samples: usize) -> AuxToMother {
        let mut out = AuxToMother::default();
        for _ in 0..samples {
            exp.process(inputs, msg, &mut out);
        }
        out
    }

    #[test]
    fn test_returns_pass_at_unity() {
        let mut exp = expander();
        let inputs = [AuxInput::stereo(1.0, 2.0); N_AUX];
        let out = run(&mut exp, &inputs, &MotherToAux::default(), 1);
        assert_eq!(out.aux_returns, [StereoSample::new(1.0, 2.0); N_AUX]);
    }

    #[test]
    fn test_sends_pass_through() {
        let mut exp = expander();
        let mut msg = MotherToAux::default();
        msg.aux_sends[1] = StereoSample::new(0.3, 0.4);
        let mut out = AuxToMother::default();
        let sends = exp.process(&[AuxInput::default(); N_AUX], &msg, &mut out);
        assert_eq!(sends[1], StereoSample::new(0.3, 0.4));
        assert_eq!(out.aux_returns, [StereoSample::ZERO; N_AUX]);
    }

    #[test]
    fn test_aux_solo_needs_its_slot() {
        let mut exp = expander();
        exp.strips[2].controls.solo = true;
        let inputs = [AuxInput::stereo(1.0, 1.0); N_AUX];
        // Slot 22 comes up on the 23rd sample
        let out = run(&mut exp, &inputs, &MotherToAux::default(), 22);
        assert_eq!(out.aux_solo_mask, 0);
        let out = run(&mut exp, &inputs, &MotherToAux::default(), 1);
        assert_eq!(out.aux_solo_mask, 0b0100);
        // Other returns fade out on the next eco ticks
        let out = run(&mut exp, &inputs, &MotherToAux::default(), 800);
        assert_eq!(out.aux_returns[0], StereoSample::ZERO);
        assert_eq!(out.aux_returns[2], StereoSample::new(1.0, 1.0));
    }

    #[test]
    fn test_track_solo_mutes_returns_when_enabled() {
        let mut exp = expander();
        let msg = MotherToAux {
            track_solo_active: true,
            mute_aux_when_track_solo: true,
            ..MotherToAux::default()
        };
        let out = run(&mut exp, &[AuxInput::stereo(1.0, 1.0); N_AUX], &msg, 1);
        assert_eq!(out.aux_returns, [StereoSample::ZERO; N_AUX]);
    }

    #[test]
    fn test_labels_follow_update_flag() {
        let mut exp = expander();
        let mut msg = MotherToAux::default();
        msg.labels[0] = Label::new("KICK");
        run(&mut exp, &[AuxInput::default(); N_AUX], &msg, 1);
        assert_eq!(exp.labels()[0].as_str(), "-01-");
        msg.update_labels = true;
        run(&mut exp, &[AuxInput::default(); N_AUX], &msg, 1);
        assert_eq!(exp.labels()[0].as_str(), "KICK");
    }

    #[test]
    fn test_mixer_settings_reach_returns() {
        let mut exp = expander();
        exp.strips[0].controls.pan = 0.0;
        let inputs = [AuxInput::stereo(1.0, 1.0); N_AUX];
        let balance = run(&mut exp, &inputs, &MotherToAux::default(), 1).aux_returns[0];
        assert_eq!(balance, StereoSample::new(1.0, 0.0));

        let msg = MotherToAux {
            pan_law_stereo: StereoPanMode::TruePan,
            cloaked: true,
            ..MotherToAux::default()
        };
        exp.reset();
        exp.strips[0].controls.pan = 0.0;
        let out = run(&mut exp, &inputs, &msg, 1);
        assert!(out.aux_returns[0].left > 1.5);
        assert!(out.aux_returns[0].right.abs() < 1e-3);
        assert_eq!(exp.strips[0].vu().levels(), (0.0, 0.0));
    }

    #[test]
    fn test_per_track_mode_uses_strip_law() {
        let mut exp = expander();
        exp.strips[1].controls.pan = 0.0;
        exp.strips[1].settings.pan_law_stereo = StereoPanLaw::TruePan;
        let msg = MotherToAux {
            pan_law_stereo: StereoPanMode::PerTrack,
            ..MotherToAux::default()
        };
        let out = run(&mut exp, &[AuxInput::stereo(1.0, 1.0); N_AUX], &msg, 1);
        assert!(out.aux_returns[1].left > 1.5);
    }

    #[test]
    fn test_reset_restores_default_labels() {
        let mut exp = expander();
        let mut msg = MotherToAux::default();
        msg.set_labels(&MixerLabels::default());
        msg.labels[20] = Label::new("VERB");
        run(&mut exp, &[AuxInput::default(); N_AUX], &msg, 1);
        assert_eq!(exp.labels()[20].as_str(), "VERB");

        exp.reset();
        assert_eq!(exp.labels()[20].as_str(), "AUXA");
        assert_eq!(exp.labels(), &default_labels());
    }

    #[test]
    fn test_round_trip_reproduces_output() {
        let mut original = expander();
        original.strips[0].controls.fader = 0.8;
        original.strips[1].controls.pan = 0.2;
        original.strips[2].controls.mute = true;
        original.strips[2].settings.fade.rate = 0.5;
        original.strips[3].controls.solo = true;
        original.strips[3].settings.pan_law_stereo = StereoPanLaw::EqualPower;
        original.send_levels[4][1] = 0.7;
        original.send_mutes[2] = true;
        let mut loaded = expander();
        loaded.from_json_str(&original.to_json_string().unwrap()).unwrap();

        let msg = MotherToAux {
            pan_law_stereo: StereoPanMode::PerTrack,
            ..MotherToAux::default()
        };
        let (mut out_a, mut out_b) = (AuxToMother::default(), AuxToMother::default());
        for i in 0..3000 {
            let x = (i as f64 * 0.05).sin() * 2.0;
            let inputs = [AuxInput::stereo(x, 0.5 * x); N_AUX];
            original.process(&inputs, &msg, &mut out_a);
            loaded.process(&inputs, &msg, &mut out_b);
            assert_eq!(out_a, out_b);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let mut exp = expander();
        exp.strips[1].controls.fader = 0.8;
        exp.strips[3].settings.pan_law_stereo = StereoPanLaw::TruePan;
        exp.send_levels[17][2] = 0.6;
        exp.send_mutes[0] = true;
        let json = exp.to_json_string().unwrap();

        let mut loaded = expander();
        loaded.from_json_str(&json).unwrap();
        assert_eq!(loaded.strips[1].controls, exp.strips[1].controls);
        assert_eq!(loaded.strips[3].settings, exp.strips[3].settings);
        assert_eq!(loaded.send_levels, exp.send_levels);
        assert_eq!(loaded.send_mutes, exp.send_mutes);
        assert!(json.contains("\"id_g1_send2\""));
    }
}
