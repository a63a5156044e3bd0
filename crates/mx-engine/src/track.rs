//! Track strip
//!
//! Per-sample path, in tap order:
//! 1. gain adjust (slewed)
//! 2. HPF/LPF when placed before the insert
//! 3. tap 0 (pre-insert), which is also the insert send
//! 4. insert return, or pass-through when unpatched
//! 5. HPF/LPF when placed after the insert
//! 6. tap 1 (pre-fader)
//! 7. pan/fader matrix, tap 2 (post-fader)
//! 8. mute/solo/fade gate, tap 3 (post-mute/solo), VU
//!
//! An unpatched left input takes the track out of use: taps are zeroed and
//! every filter, slewer and envelope goes back to rest.

use mx_core::{FilterPos, N_GRP, StereoPanLaw, StereoSample, Tap};
use mx_dsp::filters::{TrackFilters, HPF_MIN_CUTOFF, LPF_OFF_AT};
use mx_dsp::metering::VuMeter;
use mx_dsp::smoothing::SlewLimiter;
use mx_dsp::Processor;

use crate::global_info::GlobalInfo;
use crate::refresh::RefreshTick;
use crate::strip::{tap, FadeSettings, GainStage, StripControls, StripCv, Taps};

/// Largest gain adjust (+20 dB)
pub const MAX_GAIN_ADJUST: f64 = 10.0;

/// Persisted per-track settings (menus and trims)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
    /// Linear input trim
    pub gain_adjust: f64,
    pub fade: FadeSettings,
    pub hpf_cutoff: f64,
    pub lpf_cutoff: f64,
    /// Tap used when direct outs are per-track
    pub direct_out_tap: Tap,
    /// Tap used when aux sends are per-track
    pub aux_send_tap: Tap,
    /// Law used when the stereo pan law is per-track
    pub pan_law_stereo: StereoPanLaw,
    pub filter_pos: FilterPos,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            gain_adjust: 1.0,
            fade: FadeSettings::default(),
            hpf_cutoff: HPF_MIN_CUTOFF,
            lpf_cutoff: LPF_OFF_AT,
            direct_out_tap: Tap::PostFader,
            aux_send_tap: Tap::PostFader,
            pan_law_stereo: StereoPanLaw::Balance,
            filter_pos: FilterPos::PreInsert,
        }
    }
}

/// Host inputs of one track for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackInput {
    pub left: Option<f64>,
    /// Patched right input makes the track stereo
    pub right: Option<f64>,
    pub insert_return: Option<StereoSample>,
    pub cv: StripCv,
}

impl TrackInput {
    pub fn mono(v: f64) -> Self {
        Self {
            left: Some(v),
            ..Self::default()
        }
    }

    pub fn stereo(l: f64, r: f64) -> Self {
        Self {
            left: Some(l),
            right: Some(r),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    index: usize,
    pub controls: StripControls,
    pub settings: TrackSettings,
    /// Destination group, or the master mix when `None`
    group: Option<usize>,
    filters: TrackFilters,
    gain_slew: SlewLimiter,
    stage: GainStage,
    taps: Taps,
    stereo: bool,
    in_use: bool,
    primed: bool,
}

impl Track {
    pub fn new(index: usize, sample_rate: f64) -> Self {
        Self {
            index,
            controls: StripControls::default(),
            settings: TrackSettings::default(),
            group: None,
            filters: TrackFilters::new(sample_rate),
            gain_slew: SlewLimiter::slow(),
            stage: GainStage::new(sample_rate),
            taps: [StereoSample::ZERO; 4],
            stereo: false,
            in_use: false,
            primed: false,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Route to a group (0..3) or to the master mix
    pub fn set_group(&mut self, group: Option<usize>) {
        self.group = group.filter(|&g| g < N_GRP);
    }

    #[inline]
    pub fn group(&self) -> Option<usize> {
        self.group
    }

    /// Defaults for every control and setting, runtime state cleared
    pub fn reset(&mut self) {
        self.controls = StripControls::default();
        self.settings = TrackSettings::default();
        self.group = None;
        self.clear_runtime();
    }

    /// Back to rest without touching controls or settings
    pub fn clear_runtime(&mut self) {
        self.filters.reset();
        self.gain_slew.reset();
        self.stage.reset();
        self.taps = [StereoSample::ZERO; 4];
        self.in_use = false;
        self.primed = false;
    }

    pub fn process(&mut self, input: &TrackInput, gi: &GlobalInfo, tick: &RefreshTick, sample_time: f64) {
        let Some(left) = input.left else {
            if self.in_use || self.primed {
                self.clear_runtime();
            }
            return;
        };
        self.in_use = true;

        let stereo = input.right.is_some();
        if stereo != self.stereo {
            self.stereo = stereo;
            self.filters.reset();
        }
        let raw = StereoSample::new(left, input.right.unwrap_or(left)).sanitized();

        self.filters.set_hpf_cutoff(self.settings.hpf_cutoff);
        self.filters.set_lpf_cutoff(self.settings.lpf_cutoff);

        let trim = self.settings.gain_adjust.clamp(0.0, MAX_GAIN_ADJUST);
        if !self.primed {
            self.gain_slew.set(trim);
        }
        let mut x = raw * self.gain_slew.process(sample_time, trim);

        if self.settings.filter_pos == FilterPos::PreInsert {
            x = self.filters.process(x, stereo);
        }
        self.taps[0] = x;

        x = input.insert_return.map_or(x, StereoSample::sanitized);
        if self.settings.filter_pos == FilterPos::PostInsert {
            x = self.filters.process(x, stereo);
        }
        self.taps[1] = x;

        if tick.eco || !self.primed {
            let cv = &input.cv;
            let law = gi.pan_law_stereo.resolve(self.settings.pan_law_stereo);
            let matrix = self.controls.gain_matrix(cv, stereo, law, gi.pan_law_mono);
            let dt = if self.primed { tick.eco_dt(sample_time) } else { sample_time };
            self.stage.update_targets(
                matrix,
                self.controls.effective_mute(cv),
                gi.track_solo_gate(self.index, self.group),
                &self.settings.fade,
                gi.symmetrical_fade,
                dt,
            );
            if !self.primed {
                self.stage.prime();
                self.primed = true;
            }
        }

        let (post_fader, post) = self.stage.process(x, sample_time, gi.cloaked);
        self.taps[2] = post_fader;
        self.taps[3] = post;
    }

    #[inline]
    pub fn taps(&self) -> &Taps {
        &self.taps
    }

    /// Signal summed into the group or master mix
    #[inline]
    pub fn output(&self) -> StereoSample {
        self.taps[3]
    }

    #[inline]
    pub fn insert_send(&self) -> StereoSample {
        self.taps[0]
    }

    #[inline]
    pub fn direct_out(&self, gi: &GlobalInfo) -> StereoSample {
        tap(&self.taps, gi.direct_outs_mode.resolve(self.settings.direct_out_tap))
    }

    #[inline]
    pub fn aux_send_source(&self, gi: &GlobalInfo) -> StereoSample {
        tap(&self.taps, gi.aux_sends_mode.resolve(self.settings.aux_send_tap))
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    #[inline]
    pub fn vu(&self) -> &VuMeter {
        self.stage.vu()
    }

    #[inline]
    pub fn stage(&self) -> &GainStage {
        &self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::{StereoPanMode, TapMode};

    const SR: f64 = 48000.0;

    fn run(track: &mut Track, input: &TrackInput, gi: &GlobalInfo, samples: usize) {
        for _ in 0..samples {
            track.process(input, gi, &RefreshTick::full(), 1.0 / SR);
        }
    }

    #[test]
    fn test_tap_order_unity() {
        let mut track = Track::new(0, SR);
        track.settings.gain_adjust = 2.0;
        let gi = GlobalInfo::new();
        run(&mut track, &TrackInput::mono(5.0), &gi, 1);
        for t in track.taps() {
            assert_eq!(*t, StereoSample::new(10.0, 10.0));
        }
    }

    #[test]
    fn test_insert_return_replaces_signal() {
        let mut track = Track::new(0, SR);
        let gi = GlobalInfo::new();
        let input = TrackInput {
            insert_return: Some(StereoSample::new(1.0, 2.0)),
            ..TrackInput::stereo(4.0, 4.0)
        };
        run(&mut track, &input, &gi, 1);
        assert_eq!(track.taps()[0], StereoSample::new(4.0, 4.0));
        assert_eq!(track.taps()[1], StereoSample::new(1.0, 2.0));
        assert_eq!(track.taps()[3], StereoSample::new(1.0, 2.0));
        assert_eq!(track.insert_send(), StereoSample::new(4.0, 4.0));
    }

    #[test]
    fn test_pan_and_fader_post_fader_tap() {
        let mut track = Track::new(0, SR);
        track.controls.pan = 0.0;
        track.controls.fader = 0.5;
        let mut gi = GlobalInfo::new();
        gi.pan_law_stereo = StereoPanMode::Balance;
        run(&mut track, &TrackInput::stereo(8.0, 8.0), &gi, 1);
        assert_eq!(track.taps()[1], StereoSample::new(8.0, 8.0));
        assert_eq!(track.taps()[2], StereoSample::new(1.0, 0.0));
    }

    #[test]
    fn test_disconnect_zeroes_and_resets() {
        let mut track = Track::new(0, SR);
        let gi = GlobalInfo::new();
        run(&mut track, &TrackInput::mono(3.0), &gi, 10);
        assert!(track.in_use());
        assert!(track.vu().levels().0 > 0.0);

        run(&mut track, &TrackInput::default(), &gi, 1);
        assert!(!track.in_use());
        assert!(track.taps().iter().all(|t| *t == StereoSample::ZERO));
        assert_eq!(track.vu().levels(), (0.0, 0.0));

        // Reconnect primes again: exact on the first sample
        track.controls.fader = 0.0;
        run(&mut track, &TrackInput::mono(3.0), &gi, 1);
        assert_eq!(track.taps()[2], StereoSample::ZERO);
    }

    #[test]
    fn test_solo_elsewhere_silences() {
        let mut track = Track::new(2, SR);
        let mut gi = GlobalInfo::new();
        gi.update_solo_bit(5, true);
        run(&mut track, &TrackInput::mono(1.0), &gi, 1);
        assert_eq!(track.taps()[2], StereoSample::mono(1.0));
        assert_eq!(track.taps()[3], StereoSample::ZERO);
    }

    #[test]
    fn test_direct_out_modes() {
        let mut track = Track::new(0, SR);
        track.controls.mute = true;
        track.settings.direct_out_tap = Tap::PreFader;
        let mut gi = GlobalInfo::new();
        run(&mut track, &TrackInput::mono(2.0), &gi, 1);

        gi.direct_outs_mode = TapMode::PostMuteSolo;
        assert_eq!(track.direct_out(&gi), StereoSample::ZERO);
        gi.direct_outs_mode = TapMode::PerTrack;
        assert_eq!(track.direct_out(&gi), StereoSample::mono(2.0));
        gi.aux_sends_mode = TapMode::PreInsert;
        assert_eq!(track.aux_send_source(&gi), StereoSample::mono(2.0));
    }

    #[test]
    fn test_filters_pre_insert_reach_tap0() {
        let mut track = Track::new(0, SR);
        track.settings.hpf_cutoff = 200.0;
        let gi = GlobalInfo::new();
        // DC is removed by the highpass
        run(&mut track, &TrackInput::mono(5.0), &gi, 4800);
        assert!(track.taps()[0].left.abs() < 0.01);

        track.settings.filter_pos = FilterPos::PostInsert;
        track.clear_runtime();
        run(&mut track, &TrackInput::mono(5.0), &gi, 4800);
        assert_eq!(track.taps()[0], StereoSample::mono(5.0));
        assert!(track.taps()[1].left.abs() < 0.01);
    }

    #[test]
    fn test_mono_track_copies_left() {
        let mut track = Track::new(0, SR);
        let gi = GlobalInfo::new();
        run(&mut track, &TrackInput::mono(-3.0), &gi, 1);
        assert!(!track.is_stereo());
        assert_eq!(track.taps()[1], StereoSample::mono(-3.0));
    }
}
