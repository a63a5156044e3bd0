//! Group bus strip
//!
//! Input is the sum of the tracks routed to the group. A group is in use
//! while at least one track is routed to it; otherwise it rests like an
//! unpatched track. Groups are always stereo and have no trim or filters.

use mx_core::{StereoPanLaw, StereoSample, Tap};
use mx_dsp::metering::VuMeter;

use crate::global_info::{group_bit, GlobalInfo};
use crate::refresh::RefreshTick;
use crate::strip::{tap, FadeSettings, GainStage, StripControls, StripCv, Taps};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupSettings {
    pub fade: FadeSettings,
    pub direct_out_tap: Tap,
    pub aux_send_tap: Tap,
    pub pan_law_stereo: StereoPanLaw,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            fade: FadeSettings::default(),
            direct_out_tap: Tap::PostFader,
            aux_send_tap: Tap::PostFader,
            pan_law_stereo: StereoPanLaw::Balance,
        }
    }
}

/// Host inputs of one group for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupInput {
    pub insert_return: Option<StereoSample>,
    pub cv: StripCv,
}

#[derive(Debug, Clone)]
pub struct Group {
    index: usize,
    pub controls: StripControls,
    pub settings: GroupSettings,
    stage: GainStage,
    taps: Taps,
    in_use: bool,
    primed: bool,
}

impl Group {
    pub fn new(index: usize, sample_rate: f64) -> Self {
        Self {
            index,
            controls: StripControls::default(),
            settings: GroupSettings::default(),
            stage: GainStage::new(sample_rate),
            taps: [StereoSample::ZERO; 4],
            in_use: false,
            primed: false,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Solo/link bit index (after the tracks)
    #[inline]
    pub fn solo_index(&self) -> usize {
        group_bit(self.index).trailing_zeros() as usize
    }

    pub fn reset(&mut self) {
        self.controls = StripControls::default();
        self.settings = GroupSettings::default();
        self.clear_runtime();
    }

    pub fn clear_runtime(&mut self) {
        self.stage.reset();
        self.taps = [StereoSample::ZERO; 4];
        self.in_use = false;
        self.primed = false;
    }

    /// `mix` is the sum of the routed tracks' post-mute/solo taps
    pub fn process(
        &mut self,
        mix: StereoSample,
        input: &GroupInput,
        gi: &GlobalInfo,
        tick: &RefreshTick,
        sample_time: f64,
    ) {
        if !gi.group_in_use(self.index) {
            if self.in_use || self.primed {
                self.clear_runtime();
            }
            return;
        }
        self.in_use = true;

        self.taps[0] = mix;
        let x = input.insert_return.map_or(mix, StereoSample::sanitized);
        self.taps[1] = x;

        if tick.eco || !self.primed {
            let cv = &input.cv;
            let law = gi.pan_law_stereo.resolve(self.settings.pan_law_stereo);
            let matrix = self.controls.gain_matrix(cv, true, law, gi.pan_law_mono);
            let dt = if self.primed { tick.eco_dt(sample_time) } else { sample_time };
            self.stage.update_targets(
                matrix,
                self.controls.effective_mute(cv),
                gi.group_solo_gate(self.index),
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
    pub fn vu(&self) -> &VuMeter {
        self.stage.vu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::N_TRK;

    const SR: f64 = 48000.0;

    #[test]
    fn test_unused_group_rests() {
        let mut group = Group::new(1, SR);
        let gi = GlobalInfo::new();
        group.process(StereoSample::mono(3.0), &GroupInput::default(), &gi, &RefreshTick::full(), 1.0 / SR);
        assert!(!group.in_use());
        assert_eq!(group.output(), StereoSample::ZERO);
    }

    #[test]
    fn test_group_passes_mix() {
        let mut group = Group::new(1, SR);
        group.controls.fader = 0.5;
        let mut gi = GlobalInfo::new();
        gi.update_group_usage(3, Some(1));
        group.process(StereoSample::new(8.0, 16.0), &GroupInput::default(), &gi, &RefreshTick::full(), 1.0 / SR);
        assert!(group.in_use());
        assert_eq!(group.taps()[0], StereoSample::new(8.0, 16.0));
        assert_eq!(group.output(), StereoSample::new(1.0, 2.0));
        assert_eq!(group.solo_index(), N_TRK + 1);
    }

    #[test]
    fn test_group_solo_gate() {
        let mut group = Group::new(0, SR);
        let mut gi = GlobalInfo::new();
        gi.update_group_usage(0, Some(0));
        gi.update_solo_bit(7, true);
        group.process(StereoSample::mono(1.0), &GroupInput::default(), &gi, &RefreshTick::full(), 1.0 / SR);
        assert_eq!(group.output(), StereoSample::ZERO);
        assert_eq!(group.taps()[2], StereoSample::mono(1.0));
    }
}
