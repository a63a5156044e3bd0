//! Mixer ("mother" module): 16 tracks, 4 groups, master
//!
//! Provides:
//! - Per-sample routing: tracks → groups → master, plus aux sends/returns
//!   through the expansion bus
//! - Lock-free control commands from the UI thread (rtrb ring)
//! - Lock-free metering for the GUI
//! - Flat JSON patch persistence

use mx_core::{
    ClipMode, EngineConfig, FilterPos, MonoPanLaw, MxError, MxResult, N_AUX, N_GRP, N_SOLO, N_TRK,
    StereoPanLaw, StereoPanMode, StereoSample, Tap, TapMode,
};
use mx_dsp::pan_law::MAX_FADER;
use mx_dsp::smoothing::SlewLimiter;
use rtrb::{Consumer, Producer, RingBuffer};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::expansion::{AuxToMother, MotherToAux};
use crate::global_info::GlobalInfo;
use crate::group::{Group, GroupInput};
use crate::master::{Master, MasterInput};
use crate::persist::{key, master_key, parse_object, JsonReader, JsonWriter};
use crate::refresh::RefreshScheduler;
use crate::strip::StripControls;
use crate::survey::{next_mixer_id, registry, Label, MixerLabels};
use crate::track::{Track, TrackInput, MAX_GAIN_ADJUST};

/// Capacity of the control → audio command ring
pub const COMMAND_QUEUE_SIZE: usize = 1024;

/// Track or group, addressed in the shared 20-bit solo/link space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripId {
    Track(usize),
    Group(usize),
}

impl StripId {
    /// Bit index: tracks 0..15, groups 16..19
    pub fn solo_index(self) -> Option<usize> {
        match self {
            StripId::Track(t) if t < N_TRK => Some(t),
            StripId::Group(g) if g < N_GRP => Some(N_TRK + g),
            _ => None,
        }
    }

    pub fn from_solo_index(index: usize) -> Option<Self> {
        match index {
            i if i < N_TRK => Some(StripId::Track(i)),
            i if i < N_SOLO => Some(StripId::Group(i - N_TRK)),
            _ => None,
        }
    }
}

// ============ Metering ============

/// Atomic float for lock-free metering
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// VU readings of one strip, in volts
#[derive(Debug, Default)]
pub struct MeterData {
    pub level_l: AtomicF64,
    pub level_r: AtomicF64,
    pub peak_l: AtomicF64,
    pub peak_r: AtomicF64,
}

impl MeterData {
    fn store(&self, levels: (f64, f64), peaks: (f64, f64)) {
        self.level_l.store(levels.0);
        self.level_r.store(levels.1);
        self.peak_l.store(peaks.0);
        self.peak_r.store(peaks.1);
    }

    pub fn levels(&self) -> (f64, f64) {
        (self.level_l.load(), self.level_r.load())
    }

    pub fn peaks(&self) -> (f64, f64) {
        (self.peak_l.load(), self.peak_r.load())
    }
}

/// Meters shared between the audio thread and the GUI
#[derive(Debug)]
pub struct MeterBridge {
    pub tracks: [MeterData; N_TRK],
    pub groups: [MeterData; N_GRP],
    pub master: MeterData,
}

impl MeterBridge {
    pub fn new() -> Self {
        Self {
            tracks: std::array::from_fn(|_| MeterData::default()),
            groups: std::array::from_fn(|_| MeterData::default()),
            master: MeterData::default(),
        }
    }
}

impl Default for MeterBridge {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Commands ============

/// Control change sent from the UI thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixerCommand {
    // Strip controls
    SetFader(StripId, f64),
    SetPan(StripId, f64),
    SetMute(StripId, bool),
    SetSolo(StripId, bool),
    SetLinked(StripId, bool),

    // Track settings
    SetTrackGroup(usize, Option<usize>),
    SetGainAdjust(usize, f64),
    SetHpfCutoff(usize, f64),
    SetLpfCutoff(usize, f64),
    SetFilterPos(usize, FilterPos),

    // Master controls
    SetMasterFader(f64),
    SetMasterMute(bool),
    SetMasterDim(bool),
    SetMasterMono(bool),
    SetClipMode(ClipMode),

    // Global settings
    SetPanLawStereo(StereoPanMode),
    SetPanLawMono(MonoPanLaw),
    SetDirectOutsMode(TapMode),
    SetAuxSendsMode(TapMode),
    SetSymmetricalFade(bool),
    SetCloaked(bool),
    SetAuxReturnsMuteWhenSolo(bool),
    SetAuxSoloMutesDry(bool),
    SetEcoStride(usize),
}

// ============ Per-sample I/O ============

/// Host inputs of the whole mixer for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixerInputs {
    pub tracks: [TrackInput; N_TRK],
    pub groups: [GroupInput; N_GRP],
    pub master: MasterInput,
}

/// Outputs besides the master, refreshed every sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixerOutputs {
    pub master: StereoSample,
    /// Tracks then groups, at the selected direct-out tap
    pub direct_outs: [StereoSample; N_SOLO],
    /// Tracks then groups, tap 0
    pub insert_sends: [StereoSample; N_SOLO],
}

// ============ Mixer ============

pub struct Mixer {
    id: u64,
    tracks: [Track; N_TRK],
    groups: [Group; N_GRP],
    master: Master,
    gi: GlobalInfo,
    scheduler: RefreshScheduler,
    labels: MixerLabels,
    labels_dirty: bool,
    dry_slew: SlewLimiter,
    outputs: MixerOutputs,
    command_rx: Consumer<MixerCommand>,
    meters: Arc<MeterBridge>,
    default_stride: usize,
    sample_time: f64,
    primed: bool,
}

impl Mixer {
    /// Create a mixer with its command handle and meter bridge
    #[allow(clippy::type_complexity)]
    pub fn new(config: &EngineConfig) -> MxResult<(Self, MixerHandle, Arc<MeterBridge>)> {
        config.validate()?;
        let (command_tx, command_rx) = RingBuffer::new(COMMAND_QUEUE_SIZE);
        let meters = Arc::new(MeterBridge::new());
        let sr = config.sample_rate;
        let id = next_mixer_id();

        let mixer = Self {
            id,
            tracks: std::array::from_fn(|t| Track::new(t, sr)),
            groups: std::array::from_fn(|g| Group::new(g, sr)),
            master: Master::new(sr),
            gi: GlobalInfo::new(),
            scheduler: RefreshScheduler::new(config.eco_stride),
            labels: MixerLabels::default(),
            labels_dirty: true,
            dry_slew: SlewLimiter::fast(),
            outputs: MixerOutputs::default(),
            command_rx,
            meters: Arc::clone(&meters),
            default_stride: config.eco_stride,
            sample_time: config.sample_time(),
            primed: false,
        };
        registry().publish(id, mixer.labels);
        log::info!("Mixer {id} created ({sr} Hz, eco stride {})", config.eco_stride);

        Ok((mixer, MixerHandle::new(command_tx, Arc::clone(&meters)), meters))
    }

    /// Id under which the labels are published to the survey registry
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Defaults everywhere, runtime state cleared
    pub fn reset(&mut self) {
        for track in self.tracks.iter_mut() {
            track.reset();
        }
        for group in self.groups.iter_mut() {
            group.reset();
        }
        self.master.reset();
        self.gi.reset();
        self.scheduler.set_stride(self.default_stride);
        self.scheduler.reset();
        self.dry_slew.reset();
        self.outputs = MixerOutputs::default();
        self.primed = false;
        self.set_labels(MixerLabels::default());
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.pop() {
            self.apply(cmd);
        }
    }

    /// Apply one control change; out-of-range indices are ignored
    pub fn apply(&mut self, cmd: MixerCommand) {
        match cmd {
            MixerCommand::SetFader(id, v) => {
                if let Some(c) = self.controls_mut(id) {
                    c.fader = v.clamp(0.0, MAX_FADER);
                }
            }
            MixerCommand::SetPan(id, v) => {
                if let Some(c) = self.controls_mut(id) {
                    c.pan = v.clamp(0.0, 1.0);
                }
            }
            MixerCommand::SetMute(id, v) => {
                if let Some(c) = self.controls_mut(id) {
                    c.mute = v;
                }
            }
            MixerCommand::SetSolo(id, v) => {
                if let Some(c) = self.controls_mut(id) {
                    c.solo = v;
                }
            }
            MixerCommand::SetLinked(id, v) => {
                if let Some(i) = id.solo_index() {
                    self.gi.set_linked(i, v);
                }
            }
            MixerCommand::SetTrackGroup(t, g) => {
                if let Some(track) = self.tracks.get_mut(t) {
                    track.set_group(g);
                }
            }
            MixerCommand::SetGainAdjust(t, v) => {
                if let Some(track) = self.tracks.get_mut(t) {
                    track.settings.gain_adjust = v.clamp(0.0, MAX_GAIN_ADJUST);
                }
            }
            MixerCommand::SetHpfCutoff(t, v) => {
                if let Some(track) = self.tracks.get_mut(t) {
                    track.settings.hpf_cutoff = v;
                }
            }
            MixerCommand::SetLpfCutoff(t, v) => {
                if let Some(track) = self.tracks.get_mut(t) {
                    track.settings.lpf_cutoff = v;
                }
            }
            MixerCommand::SetFilterPos(t, v) => {
                if let Some(track) = self.tracks.get_mut(t) {
                    track.settings.filter_pos = v;
                }
            }
            MixerCommand::SetMasterFader(v) => self.master.controls.fader = v.clamp(0.0, MAX_FADER),
            MixerCommand::SetMasterMute(v) => self.master.controls.mute = v,
            MixerCommand::SetMasterDim(v) => self.master.controls.dim = v,
            MixerCommand::SetMasterMono(v) => self.master.controls.mono = v,
            MixerCommand::SetClipMode(v) => self.master.settings.clipping = v,
            MixerCommand::SetPanLawStereo(v) => self.gi.pan_law_stereo = v,
            MixerCommand::SetPanLawMono(v) => self.gi.pan_law_mono = v,
            MixerCommand::SetDirectOutsMode(v) => self.gi.direct_outs_mode = v,
            MixerCommand::SetAuxSendsMode(v) => self.gi.aux_sends_mode = v,
            MixerCommand::SetSymmetricalFade(v) => self.gi.symmetrical_fade = v,
            MixerCommand::SetCloaked(v) => self.gi.cloaked = v,
            MixerCommand::SetAuxReturnsMuteWhenSolo(v) => self.gi.aux_returns_mute_when_track_solo = v,
            MixerCommand::SetAuxSoloMutesDry(v) => self.gi.aux_solo_mutes_dry = v,
            MixerCommand::SetEcoStride(v) => self.scheduler.set_stride(v),
        }
    }

    fn controls_mut(&mut self, id: StripId) -> Option<&mut StripControls> {
        match id {
            StripId::Track(t) => self.tracks.get_mut(t).map(|s| &mut s.controls),
            StripId::Group(g) => self.groups.get_mut(g).map(|s| &mut s.controls),
        }
    }

    /// Staggered slow work for one refresh slot
    fn refresh_slot(&mut self, slot: usize, inputs: &MixerInputs) {
        if slot < N_TRK {
            let track = &self.tracks[slot];
            let input = &inputs.tracks[slot];
            self.gi
                .update_solo_bit(slot, track.controls.effective_solo(&input.cv));
            let group = if input.left.is_some() { track.group() } else { None };
            self.gi.update_group_usage(slot, group);
        } else if slot < N_SOLO {
            let g = slot - N_TRK;
            let soloed = self.groups[g].controls.effective_solo(&inputs.groups[g].cv);
            self.gi.update_solo_bit(slot, soloed);
        }
    }

    fn process_linked(&mut self) {
        if self.gi.link_bit_mask == 0 {
            return;
        }
        let mut faders: [f64; N_SOLO] = std::array::from_fn(|i| {
            if i < N_TRK {
                self.tracks[i].controls.fader
            } else {
                self.groups[i - N_TRK].controls.fader
            }
        });
        for i in 0..N_SOLO {
            self.gi.process_linked(i, &mut faders);
        }
        for (i, &fader) in faders.iter().enumerate() {
            if i < N_TRK {
                self.tracks[i].controls.fader = fader;
            } else {
                self.groups[i - N_TRK].controls.fader = fader;
            }
        }
    }

    /// Σ source · level³ per aux, over tracks then groups
    fn compute_sends(&self, from_aux: &AuxToMother) -> [StereoSample; N_AUX] {
        let mut sends = [StereoSample::ZERO; N_AUX];
        let sources = self
            .tracks
            .iter()
            .map(|t| t.aux_send_source(&self.gi))
            .chain(self.groups.iter().map(|g| g.aux_send_source(&self.gi)));
        for (source, levels) in sources.zip(from_aux.send_levels.iter()) {
            for (send, &level) in sends.iter_mut().zip(levels.iter()) {
                if level.is_finite() && level > 0.0 {
                    let level = level.min(1.0);
                    *send += source * (level * level * level);
                }
            }
        }
        for (send, &muted) in sends.iter_mut().zip(from_aux.send_mutes.iter()) {
            if muted {
                *send = StereoSample::ZERO;
            }
        }
        sends
    }

    /// Process one sample
    ///
    /// `from_aux` is the expander's last message, `None` when no expander is
    /// attached. `to_aux` receives this sample's message for it.
    pub fn process(
        &mut self,
        inputs: &MixerInputs,
        from_aux: Option<&AuxToMother>,
        to_aux: Option<&mut MotherToAux>,
    ) -> StereoSample {
        self.process_commands();

        let tick = self.scheduler.tick();
        let dt = self.sample_time;
        self.gi.aux_solo_mask = from_aux.map_or(0, |m| m.aux_solo_mask);
        self.refresh_slot(tick.slot, inputs);
        if tick.eco {
            self.process_linked();
        }

        let mut dry = StereoSample::ZERO;
        let mut group_mix = [StereoSample::ZERO; N_GRP];
        for (track, input) in self.tracks.iter_mut().zip(inputs.tracks.iter()) {
            track.process(input, &self.gi, &tick, dt);
            match track.group() {
                Some(g) => group_mix[g] += track.output(),
                None => dry += track.output(),
            }
        }
        for ((group, mix), input) in self.groups.iter_mut().zip(group_mix).zip(inputs.groups.iter()) {
            group.process(mix, input, &self.gi, &tick, dt);
            dry += group.output();
        }

        let dry_target = if self.gi.aux_solo_mutes_dry && self.gi.aux_solo_mask != 0 { 0.0 } else { 1.0 };
        if !self.primed {
            self.dry_slew.set(dry_target);
            self.primed = true;
        }
        let mut mix = dry * self.dry_slew.process(dt, dry_target);

        let mut sends = [StereoSample::ZERO; N_AUX];
        if let Some(msg) = from_aux {
            sends = self.compute_sends(msg);
            for ret in msg.aux_returns {
                mix += ret.sanitized();
            }
        }

        let out = self.master.process(mix, &inputs.master, &self.gi, &tick, dt);

        self.outputs.master = out;
        for (i, track) in self.tracks.iter().enumerate() {
            self.outputs.direct_outs[i] = track.direct_out(&self.gi);
            self.outputs.insert_sends[i] = track.insert_send();
        }
        for (g, group) in self.groups.iter().enumerate() {
            self.outputs.direct_outs[N_TRK + g] = group.direct_out(&self.gi);
            self.outputs.insert_sends[N_TRK + g] = group.insert_send();
        }

        if let Some(msg) = to_aux {
            msg.aux_sends = sends;
            msg.track_solo_active = self.gi.any_solo();
            msg.mute_aux_when_track_solo = self.gi.aux_returns_mute_when_track_solo;
            msg.pan_law_stereo = self.gi.pan_law_stereo;
            msg.pan_law_mono = self.gi.pan_law_mono;
            msg.symmetrical_fade = self.gi.symmetrical_fade;
            msg.cloaked = self.gi.cloaked;
            if self.labels_dirty {
                msg.set_labels(&self.labels);
                self.labels_dirty = false;
            } else {
                msg.update_labels = false;
            }
        }

        if tick.eco {
            self.update_meters();
        }
        out
    }

    fn update_meters(&self) {
        for (meter, track) in self.meters.tracks.iter().zip(self.tracks.iter()) {
            meter.store(track.vu().levels(), track.vu().peaks());
        }
        for (meter, group) in self.meters.groups.iter().zip(self.groups.iter()) {
            meter.store(group.vu().levels(), group.vu().peaks());
        }
        self.meters
            .master
            .store(self.master.vu().levels(), self.master.vu().peaks());
    }

    // ============ Accessors ============

    pub fn track(&self, t: usize) -> &Track {
        &self.tracks[t]
    }

    pub fn track_mut(&mut self, t: usize) -> &mut Track {
        &mut self.tracks[t]
    }

    pub fn group(&self, g: usize) -> &Group {
        &self.groups[g]
    }

    pub fn group_mut(&mut self, g: usize) -> &mut Group {
        &mut self.groups[g]
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut Master {
        &mut self.master
    }

    pub fn global(&self) -> &GlobalInfo {
        &self.gi
    }

    pub fn global_mut(&mut self) -> &mut GlobalInfo {
        &mut self.gi
    }

    #[inline]
    pub fn outputs(&self) -> &MixerOutputs {
        &self.outputs
    }

    pub fn eco_stride(&self) -> usize {
        self.scheduler.stride()
    }

    pub fn meters(&self) -> &Arc<MeterBridge> {
        &self.meters
    }

    // ============ Labels ============

    pub fn labels(&self) -> &MixerLabels {
        &self.labels
    }

    /// Label of track (0..15), group (16..19) or aux (20..23)
    pub fn set_label(&mut self, index: usize, text: &str) {
        let mut labels = self.labels;
        labels.set(index, Label::new(text));
        self.set_labels(labels);
    }

    fn set_labels(&mut self, labels: MixerLabels) {
        self.labels = labels;
        self.labels_dirty = true;
        registry().publish(self.id, labels);
    }

    // ============ Persistence ============

    pub fn data_to_json(&self) -> Value {
        let mut w = JsonWriter::new();

        for (t, track) in self.tracks.iter().enumerate() {
            write_controls(&mut w, "t", t, &track.controls);
            let s = &track.settings;
            w.int(key("t", t, "group"), track.group().map_or(0, |g| g as i64 + 1));
            w.bool(key("t", t, "linked"), self.gi.is_linked(t));
            w.label(key("t", t, "label"), self.labels.tracks[t]);
            w.f64(key("t", t, "gainAdjust"), s.gain_adjust);
            w.f64(key("t", t, "fadeRate"), s.fade.rate);
            w.f64(key("t", t, "fadeProfile"), s.fade.profile);
            w.f64(key("t", t, "hpfCutoff"), s.hpf_cutoff);
            w.f64(key("t", t, "lpfCutoff"), s.lpf_cutoff);
            w.int(key("t", t, "directOutMode"), s.direct_out_tap.index() as i64);
            w.int(key("t", t, "auxSendMode"), s.aux_send_tap.index() as i64);
            w.int(key("t", t, "panLawStereo"), s.pan_law_stereo.index() as i64);
            w.int(key("t", t, "filterPos"), s.filter_pos.index() as i64);
        }

        for (g, group) in self.groups.iter().enumerate() {
            write_controls(&mut w, "g", g, &group.controls);
            let s = &group.settings;
            w.bool(key("g", g, "linked"), self.gi.is_linked(N_TRK + g));
            w.label(key("g", g, "label"), self.labels.groups[g]);
            w.f64(key("g", g, "fadeRate"), s.fade.rate);
            w.f64(key("g", g, "fadeProfile"), s.fade.profile);
            w.int(key("g", g, "directOutMode"), s.direct_out_tap.index() as i64);
            w.int(key("g", g, "auxSendMode"), s.aux_send_tap.index() as i64);
            w.int(key("g", g, "panLawStereo"), s.pan_law_stereo.index() as i64);
        }

        for (a, &label) in self.labels.aux.iter().enumerate() {
            w.label(key("a", a, "label"), label);
        }

        let m = &self.master;
        w.f64(master_key("fader"), m.controls.fader);
        w.bool(master_key("mute"), m.controls.mute);
        w.bool(master_key("dim"), m.controls.dim);
        w.bool(master_key("mono"), m.controls.mono);
        w.f64(master_key("fadeRate"), m.settings.fade.rate);
        w.f64(master_key("fadeProfile"), m.settings.fade.profile);
        w.f64(master_key("dimGain"), m.settings.dim_gain);
        w.bool(master_key("dcBlock"), m.settings.dc_block);
        w.int(master_key("clipping"), m.settings.clipping.index() as i64);

        let gi = &self.gi;
        w.int("panLawStereo", gi.pan_law_stereo.index() as i64);
        w.int("panLawMono", gi.pan_law_mono.index() as i64);
        w.int("directOutsMode", gi.direct_outs_mode.index() as i64);
        w.int("auxSendsMode", gi.aux_sends_mode.index() as i64);
        w.int("ecoMode", self.scheduler.stride() as i64);
        w.bool("symmetricalFade", gi.symmetrical_fade);
        w.bool("cloakedMode", gi.cloaked);
        w.bool("auxReturnsMuteWhenSolo", gi.aux_returns_mute_when_track_solo);
        w.bool("auxSoloMutesDry", gi.aux_solo_mutes_dry);

        w.finish()
    }

    /// Reset, then apply every present and well-typed key
    pub fn data_from_json(&mut self, value: &Value) {
        self.reset();
        let r = JsonReader::new(value);
        let mut labels = MixerLabels::default();

        for (t, track) in self.tracks.iter_mut().enumerate() {
            read_controls(&r, "t", t, &mut track.controls);
            let mut group = 0;
            r.int(&key("t", t, "group"), &mut group);
            track.set_group(usize::try_from(group - 1).ok());
            let mut linked = false;
            r.bool(&key("t", t, "linked"), &mut linked);
            self.gi.set_linked(t, linked);
            r.label(&key("t", t, "label"), &mut labels.tracks[t]);

            let s = &mut track.settings;
            r.f64(&key("t", t, "gainAdjust"), &mut s.gain_adjust);
            s.gain_adjust = s.gain_adjust.clamp(0.0, MAX_GAIN_ADJUST);
            r.f64(&key("t", t, "fadeRate"), &mut s.fade.rate);
            r.f64(&key("t", t, "fadeProfile"), &mut s.fade.profile);
            r.f64(&key("t", t, "hpfCutoff"), &mut s.hpf_cutoff);
            r.f64(&key("t", t, "lpfCutoff"), &mut s.lpf_cutoff);
            r.index(&key("t", t, "directOutMode"), &mut s.direct_out_tap, Tap::from_index);
            r.index(&key("t", t, "auxSendMode"), &mut s.aux_send_tap, Tap::from_index);
            r.index(&key("t", t, "panLawStereo"), &mut s.pan_law_stereo, StereoPanLaw::from_index);
            r.index(&key("t", t, "filterPos"), &mut s.filter_pos, FilterPos::from_index);
        }

        for (g, group) in self.groups.iter_mut().enumerate() {
            read_controls(&r, "g", g, &mut group.controls);
            let mut linked = false;
            r.bool(&key("g", g, "linked"), &mut linked);
            self.gi.set_linked(N_TRK + g, linked);
            r.label(&key("g", g, "label"), &mut labels.groups[g]);

            let s = &mut group.settings;
            r.f64(&key("g", g, "fadeRate"), &mut s.fade.rate);
            r.f64(&key("g", g, "fadeProfile"), &mut s.fade.profile);
            r.index(&key("g", g, "directOutMode"), &mut s.direct_out_tap, Tap::from_index);
            r.index(&key("g", g, "auxSendMode"), &mut s.aux_send_tap, Tap::from_index);
            r.index(&key("g", g, "panLawStereo"), &mut s.pan_law_stereo, StereoPanLaw::from_index);
        }

        for (a, label) in labels.aux.iter_mut().enumerate() {
            r.label(&key("a", a, "label"), label);
        }

        let m = &mut self.master;
        r.f64(&master_key("fader"), &mut m.controls.fader);
        m.controls.fader = m.controls.fader.clamp(0.0, MAX_FADER);
        r.bool(&master_key("mute"), &mut m.controls.mute);
        r.bool(&master_key("dim"), &mut m.controls.dim);
        r.bool(&master_key("mono"), &mut m.controls.mono);
        r.f64(&master_key("fadeRate"), &mut m.settings.fade.rate);
        r.f64(&master_key("fadeProfile"), &mut m.settings.fade.profile);
        r.f64(&master_key("dimGain"), &mut m.settings.dim_gain);
        r.bool(&master_key("dcBlock"), &mut m.settings.dc_block);
        r.index(&master_key("clipping"), &mut m.settings.clipping, ClipMode::from_index);

        let gi = &mut self.gi;
        r.index("panLawStereo", &mut gi.pan_law_stereo, StereoPanMode::from_index);
        r.index("panLawMono", &mut gi.pan_law_mono, MonoPanLaw::from_index);
        r.index("directOutsMode", &mut gi.direct_outs_mode, TapMode::from_index);
        r.index("auxSendsMode", &mut gi.aux_sends_mode, TapMode::from_index);
        let mut stride = self.scheduler.stride() as i64;
        r.int("ecoMode", &mut stride);
        self.scheduler.set_stride(usize::try_from(stride).unwrap_or(1));
        r.bool("symmetricalFade", &mut gi.symmetrical_fade);
        r.bool("cloakedMode", &mut gi.cloaked);
        r.bool("auxReturnsMuteWhenSolo", &mut gi.aux_returns_mute_when_track_solo);
        r.bool("auxSoloMutesDry", &mut gi.aux_solo_mutes_dry);

        self.set_labels(labels);
    }

    pub fn to_json_string(&self) -> MxResult<String> {
        Ok(serde_json::to_string(&self.data_to_json())?)
    }

    /// Load a patch string; a parse error leaves the mixer untouched
    pub fn from_json_str(&mut self, json: &str) -> MxResult<()> {
        let value = parse_object(json)?;
        self.data_from_json(&value);
        Ok(())
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        registry().unregister(self.id);
        log::info!("Mixer {} dropped", self.id);
    }
}

fn write_controls(w: &mut JsonWriter, prefix: &str, index: usize, c: &StripControls) {
    w.f64(key(prefix, index, "fader"), c.fader);
    w.f64(key(prefix, index, "pan"), c.pan);
    w.bool(key(prefix, index, "mute"), c.mute);
    w.bool(key(prefix, index, "solo"), c.solo);
}

fn read_controls(r: &JsonReader<'_>, prefix: &str, index: usize, c: &mut StripControls) {
    r.f64(&key(prefix, index, "fader"), &mut c.fader);
    c.fader = c.fader.clamp(0.0, MAX_FADER);
    r.f64(&key(prefix, index, "pan"), &mut c.pan);
    c.pan = c.pan.clamp(0.0, 1.0);
    r.bool(&key(prefix, index, "mute"), &mut c.mute);
    r.bool(&key(prefix, index, "solo"), &mut c.solo);
}

// ============ Handle ============

/// Handle for controlling the mixer from the UI thread
pub struct MixerHandle {
    command_tx: Producer<MixerCommand>,
    meters: Arc<MeterBridge>,
}

impl MixerHandle {
    pub fn new(command_tx: Producer<MixerCommand>, meters: Arc<MeterBridge>) -> Self {
        Self { command_tx, meters }
    }

    /// Queue a command for the next processed sample
    pub fn send(&mut self, cmd: MixerCommand) -> MxResult<()> {
        self.command_tx.push(cmd).map_err(|_| MxError::QueueFull)
    }

    pub fn set_fader(&mut self, id: StripId, knob: f64) -> MxResult<()> {
        self.send(MixerCommand::SetFader(id, knob))
    }

    pub fn set_pan(&mut self, id: StripId, pan: f64) -> MxResult<()> {
        self.send(MixerCommand::SetPan(id, pan))
    }

    pub fn set_mute(&mut self, id: StripId, mute: bool) -> MxResult<()> {
        self.send(MixerCommand::SetMute(id, mute))
    }

    pub fn set_solo(&mut self, id: StripId, solo: bool) -> MxResult<()> {
        self.send(MixerCommand::SetSolo(id, solo))
    }

    pub fn set_track_group(&mut self, track: usize, group: Option<usize>) -> MxResult<()> {
        self.send(MixerCommand::SetTrackGroup(track, group))
    }

    pub fn set_master_fader(&mut self, knob: f64) -> MxResult<()> {
        self.send(MixerCommand::SetMasterFader(knob))
    }

    /// Free slots in the command ring
    pub fn capacity_left(&self) -> usize {
        self.command_tx.slots()
    }

    // Metering
    pub fn track_level(&self, t: usize) -> (f64, f64) {
        self.meters.tracks.get(t).map_or((0.0, 0.0), MeterData::levels)
    }

    pub fn group_level(&self, g: usize) -> (f64, f64) {
        self.meters.groups.get(g).map_or((0.0, 0.0), MeterData::levels)
    }

    pub fn master_level(&self) -> (f64, f64) {
        self.meters.master.levels()
    }

    pub fn master_peak(&self) -> (f64, f64) {
        self.meters.master.peaks()
    }

    /// Get direct access to meter bridge for custom rendering
    pub fn meters(&self) -> Arc<MeterBridge> {
        Arc::clone(&self.meters)
    }
}
