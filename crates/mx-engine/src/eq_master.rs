//! EQ module: one 4-band `TrackEq` for each of the 24 mixer strips
//!
//! Tracks are laid out like the mixer's labels (16 tracks, 4 groups, 4 aux).
//! The selected track feeds the spectrum analyzer, before or after its EQ.
//! When mapped to a mixer, labels are pulled from the survey registry once
//! per refresh cycle.

use mx_core::{DecayRate, EngineConfig, MxResult, N_EQ_TRK, StereoSample};
use mx_dsp::eq::{BandCv, TrackEq, TrackEqParams, N_BANDS};
use mx_dsp::spectrum::{SpectrumAnalyzer, SpectrumView};
use serde_json::Value;

use crate::persist::{key, parse_object, JsonReader, JsonWriter};
use crate::refresh::RefreshScheduler;
use crate::survey::{registry, Label, MixerLabels};

/// Which signal of the selected track goes to the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectrumMode {
    #[default]
    Off = 0,
    Pre = 1,
    Post = 2,
}

impl SpectrumMode {
    pub const ALL: &'static [SpectrumMode] = &[SpectrumMode::Off, SpectrumMode::Pre, SpectrumMode::Post];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Host inputs of one EQ track for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EqTrackInput {
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub cv: [BandCv; N_BANDS],
}

impl EqTrackInput {
    pub fn stereo(l: f64, r: f64) -> Self {
        Self {
            left: Some(l),
            right: Some(r),
            ..Self::default()
        }
    }
}

fn default_labels() -> [Label; N_EQ_TRK] {
    let mut labels = [Label::BLANK; N_EQ_TRK];
    for (dst, src) in labels.iter_mut().zip(MixerLabels::default().flat()) {
        *dst = src;
    }
    labels
}

pub struct EqMaster {
    tracks: [TrackEq; N_EQ_TRK],
    /// `Some(stereo)` while patched
    patched: [Option<bool>; N_EQ_TRK],
    labels: [Label; N_EQ_TRK],
    selected: usize,
    spectrum_mode: SpectrumMode,
    analyzer: SpectrumAnalyzer,
    mapped_mixer: Option<u64>,
    scheduler: RefreshScheduler,
    config: EngineConfig,
}

impl EqMaster {
    pub fn new(config: &EngineConfig) -> MxResult<Self> {
        config.validate()?;
        let sr = config.sample_rate;
        let analyzer = SpectrumAnalyzer::new(&config.spectrum, sr)?;
        Ok(Self {
            tracks: std::array::from_fn(|_| TrackEq::new(sr)),
            patched: [None; N_EQ_TRK],
            labels: default_labels(),
            selected: 0,
            spectrum_mode: SpectrumMode::Off,
            analyzer,
            mapped_mixer: None,
            scheduler: RefreshScheduler::new(config.eco_stride),
            config: config.clone(),
        })
    }

    /// Defaults everywhere; the mixer mapping is kept
    pub fn reset(&mut self) {
        for track in self.tracks.iter_mut() {
            track.set_params(TrackEqParams::default());
            track.update(&[BandCv::default(); N_BANDS]);
            track.reset();
        }
        self.patched = [None; N_EQ_TRK];
        self.labels = default_labels();
        self.selected = 0;
        self.set_spectrum_mode(SpectrumMode::Off);
        self.analyzer.set_decay(self.config.spectrum.decay);
        self.scheduler.reset();
    }

    /// One sample for all tracks. Unpatched tracks output silence.
    pub fn process(&mut self, inputs: &[EqTrackInput; N_EQ_TRK]) -> [StereoSample; N_EQ_TRK] {
        let tick = self.scheduler.tick();
        if tick.slot == 0 {
            self.pull_labels();
        }

        let mut out = [StereoSample::ZERO; N_EQ_TRK];
        for (t, (track, input)) in self.tracks.iter_mut().zip(inputs.iter()).enumerate() {
            let Some(left) = input.left else {
                if self.patched[t].take().is_some() {
                    track.reset();
                }
                // Keep the drawn curve current without running the cascade
                track.update(&input.cv);
                if t == self.selected && self.spectrum_mode != SpectrumMode::Off {
                    self.analyzer.push(StereoSample::ZERO);
                }
                continue;
            };
            let stereo = input.right.is_some();
            if self.patched[t] != Some(stereo) {
                self.patched[t] = Some(stereo);
                track.reset();
            }
            let x = StereoSample::new(left, input.right.unwrap_or(left)).sanitized();
            let y = track.process(x, stereo, &input.cv);
            out[t] = y;

            if t == self.selected {
                match self.spectrum_mode {
                    SpectrumMode::Off => {}
                    SpectrumMode::Pre => self.analyzer.push(x),
                    SpectrumMode::Post => self.analyzer.push(y),
                }
            }
        }
        out
    }

    fn pull_labels(&mut self) {
        let Some(id) = self.mapped_mixer else {
            return;
        };
        // Skip this cycle if a mixer is publishing right now
        if let Some(labels) = registry().try_labels(id) {
            for (dst, src) in self.labels.iter_mut().zip(labels.flat()) {
                *dst = src;
            }
        }
    }

    /// Follow a mixer's labels, or go back to the defaults with `None`
    pub fn map_mixer(&mut self, mixer_id: Option<u64>) {
        self.mapped_mixer = mixer_id;
        if mixer_id.is_none() {
            self.labels = default_labels();
        }
    }

    pub fn mapped_mixer(&self) -> Option<u64> {
        self.mapped_mixer
    }

    pub fn labels(&self) -> &[Label; N_EQ_TRK] {
        &self.labels
    }

    pub fn track(&self, t: usize) -> &TrackEq {
        &self.tracks[t]
    }

    pub fn track_mut(&mut self, t: usize) -> &mut TrackEq {
        &mut self.tracks[t]
    }

    pub fn selected_track(&self) -> usize {
        self.selected
    }

    pub fn set_selected_track(&mut self, t: usize) {
        if t < N_EQ_TRK && t != self.selected {
            self.selected = t;
            self.analyzer.restart_page();
        }
    }

    pub fn spectrum_mode(&self) -> SpectrumMode {
        self.spectrum_mode
    }

    pub fn set_spectrum_mode(&mut self, mode: SpectrumMode) {
        if mode != self.spectrum_mode {
            self.spectrum_mode = mode;
            self.analyzer.restart_page();
        }
    }

    pub fn set_decay(&self, rate: DecayRate) {
        self.analyzer.set_decay(rate);
    }

    pub fn analyzer(&self) -> &SpectrumAnalyzer {
        &self.analyzer
    }

    /// Reader handle for the GUI side
    pub fn spectrum_view(&self) -> SpectrumView {
        self.analyzer.view()
    }

    /// Response curve of the selected track over the analyzer's range
    pub fn draw_curve(&self, points: usize) -> Vec<(f64, f64)> {
        let spectrum = &self.config.spectrum;
        self.tracks[self.selected].draw_curve(points, spectrum.min_freq, spectrum.max_freq)
    }

    // ============ Persistence ============

    pub fn data_to_json(&self) -> Value {
        let mut w = JsonWriter::new();
        for (t, track) in self.tracks.iter().enumerate() {
            match serde_json::to_value(track.params()) {
                Ok(v) => w.value(key("e", t, "params"), v),
                Err(e) => log::debug!("EQ track {t} not saved: {e}"),
            }
            w.label(key("e", t, "label"), self.labels[t]);
        }
        w.int("selectedTrack", self.selected as i64);
        w.int("spectrumMode", self.spectrum_mode.index() as i64);
        w.int("decayRate", self.analyzer.decay().index() as i64);
        w.finish()
    }

    pub fn data_from_json(&mut self, value: &Value) {
        self.reset();
        let r = JsonReader::new(value);
        for (t, track) in self.tracks.iter_mut().enumerate() {
            let mut params = TrackEqParams::default();
            r.serde(&key("e", t, "params"), &mut params);
            track.set_params(params);
            track.update(&[BandCv::default(); N_BANDS]);
            if self.mapped_mixer.is_none() {
                r.label(&key("e", t, "label"), &mut self.labels[t]);
            }
        }
        let mut selected = 0;
        r.int("selectedTrack", &mut selected);
        self.set_selected_track(usize::try_from(selected).unwrap_or(0));
        let mut mode = SpectrumMode::Off;
        r.index("spectrumMode", &mut mode, SpectrumMode::from_index);
        self.set_spectrum_mode(mode);
        let mut decay = self.config.spectrum.decay;
        r.index("decayRate", &mut decay, DecayRate::from_index);
        self.analyzer.set_decay(decay);
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
