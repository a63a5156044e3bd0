//! Four-band track EQ
//!
//! Each track runs a `QuattroBiQuad`: four cascaded stereo biquads.
//! - Band 0: low shelf, or peak when `low_peak` is set
//! - Bands 1 and 2: peak
//! - Band 3: high shelf, or peak when `high_peak` is set
//!
//! Frequency, gain and Q of every band can be pushed around by CV, scaled
//! by a per-parameter attenuation. Coefficients are only redesigned when
//! the effective (post-CV) setting of a band changes.

use mx_core::{db_to_linear, StereoSample};
use serde::{Deserialize, Serialize};

use crate::biquad::{BiquadCoeffs, BiquadKind, BiquadTDF2, normalized_freq};
use crate::{MonoProcessor, Processor, ProcessorConfig};

pub const N_BANDS: usize = 4;

/// Lowest band frequency (Hz)
pub const MIN_FREQ_HZ: f64 = 20.0;
/// Highest band frequency (Hz)
pub const MAX_FREQ_HZ: f64 = 22000.0;
pub const MAX_BAND_GAIN_DB: f64 = 20.0;
pub const MAX_TRACK_GAIN_DB: f64 = 20.0;
pub const MIN_Q: f64 = 0.3;
pub const MAX_Q: f64 = 20.0;

/// CV scaling: dB per volt of gain CV
pub const CV_GAIN_DB_PER_VOLT: f64 = 2.0;

const DEFAULT_FREQS_HZ: [f64; N_BANDS] = [100.0, 500.0, 2000.0, 8000.0];
const DEFAULT_Q: [f64; N_BANDS] = [0.707, 1.0, 1.0, 0.707];

#[inline]
pub fn min_freq_log() -> f64 {
    MIN_FREQ_HZ.log10()
}

#[inline]
pub fn max_freq_log() -> f64 {
    MAX_FREQ_HZ.log10()
}

// ============ Parameters ============

/// One band's stored parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandParams {
    pub active: bool,
    /// log10 of the frequency in Hz
    pub freq_log: f64,
    pub gain_db: f64,
    pub q: f64,
    /// CV attenuation for frequency, gain and Q, each in [0, 1]
    pub cv_freq_atten: f64,
    pub cv_gain_atten: f64,
    pub cv_q_atten: f64,
}

impl Default for BandParams {
    fn default() -> Self {
        Self {
            active: true,
            freq_log: DEFAULT_FREQS_HZ[1].log10(),
            gain_db: 0.0,
            q: 1.0,
            cv_freq_atten: 1.0,
            cv_gain_atten: 1.0,
            cv_q_atten: 1.0,
        }
    }
}

impl BandParams {
    fn default_for(band: usize) -> Self {
        Self {
            freq_log: DEFAULT_FREQS_HZ[band].log10(),
            q: DEFAULT_Q[band],
            ..Self::default()
        }
    }

    #[inline]
    pub fn freq_hz(&self) -> f64 {
        10.0_f64.powf(self.freq_log)
    }
}

/// A track's stored EQ parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackEqParams {
    pub active: bool,
    pub gain_db: f64,
    pub bands: [BandParams; N_BANDS],
    /// Band 0 is a peak instead of a low shelf
    pub low_peak: bool,
    /// Band 3 is a peak instead of a high shelf
    pub high_peak: bool,
}

impl Default for TrackEqParams {
    fn default() -> Self {
        Self {
            active: true,
            gain_db: 0.0,
            bands: std::array::from_fn(BandParams::default_for),
            low_peak: false,
            high_peak: false,
        }
    }
}

impl TrackEqParams {
    pub fn band_kind(&self, band: usize) -> BiquadKind {
        match band {
            0 if !self.low_peak => BiquadKind::LowShelf,
            3 if !self.high_peak => BiquadKind::HighShelf,
            _ => BiquadKind::Peaking,
        }
    }
}

/// CV inputs for one band; `None` means unpatched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandCv {
    pub freq: Option<f64>,
    pub gain: Option<f64>,
    pub q: Option<f64>,
}

/// Effective band setting after CV, the unit of change detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSetting {
    pub active: bool,
    pub kind: BiquadKind,
    pub freq_hz: f64,
    pub gain_db: f64,
    pub q: f64,
}

impl BandSetting {
    pub fn resolve(params: &TrackEqParams, band: usize, cv: &BandCv) -> Self {
        let p = &params.bands[band];
        let mut freq_log = p.freq_log;
        let mut gain_db = p.gain_db;
        let mut q = p.q;
        if let Some(v) = cv.freq.filter(|v| v.is_finite()) {
            // 1 V/oct
            freq_log += v * std::f64::consts::LOG10_2 * p.cv_freq_atten;
        }
        if let Some(v) = cv.gain.filter(|v| v.is_finite()) {
            gain_db += v * CV_GAIN_DB_PER_VOLT * p.cv_gain_atten;
        }
        if let Some(v) = cv.q.filter(|v| v.is_finite()) {
            q += v * (MAX_Q - MIN_Q) / 10.0 * p.cv_q_atten;
        }
        Self {
            active: p.active,
            kind: params.band_kind(band),
            freq_hz: 10.0_f64.powf(freq_log.clamp(min_freq_log(), max_freq_log())),
            gain_db: gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB),
            q: q.clamp(MIN_Q, MAX_Q),
        }
    }

    pub fn coeffs(&self, sample_rate: f64) -> BiquadCoeffs {
        if !self.active {
            return BiquadCoeffs::bypass();
        }
        BiquadCoeffs::design(
            self.kind,
            normalized_freq(self.freq_hz, sample_rate),
            self.q,
            self.gain_db,
        )
    }
}

// ============ Cascade ============

/// Four cascaded stereo biquads
#[derive(Debug, Clone, Default)]
pub struct QuattroBiQuad {
    sections: [[BiquadTDF2; 2]; N_BANDS],
    active: [bool; N_BANDS],
}

impl QuattroBiQuad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_band(&mut self, band: usize, coeffs: BiquadCoeffs, active: bool) {
        for ch in self.sections[band].iter_mut() {
            ch.set_coeffs(coeffs);
        }
        if active && !self.active[band] {
            // Re-entering a band starts from rest
            for ch in self.sections[band].iter_mut() {
                ch.reset();
            }
        }
        self.active[band] = active;
    }

    #[inline]
    pub fn coeffs(&self, band: usize) -> &BiquadCoeffs {
        self.sections[band][0].coeffs()
    }

    #[inline]
    pub fn is_active(&self, band: usize) -> bool {
        self.active[band]
    }

    #[inline]
    pub fn process(&mut self, input: StereoSample, stereo: bool) -> StereoSample {
        let mut l = input.left;
        let mut r = input.right;
        for (band, sections) in self.sections.iter_mut().enumerate() {
            if !self.active[band] {
                continue;
            }
            l = sections[0].process_sample(l);
            if stereo {
                r = sections[1].process_sample(r);
            }
        }
        if stereo { StereoSample::new(l, r) } else { StereoSample::mono(l) }
    }

    /// Summed band response in dB at a normalized frequency
    pub fn response_db(&self, norm_freq: f64) -> f64 {
        (0..N_BANDS)
            .filter(|&b| self.active[b])
            .map(|b| self.coeffs(b).magnitude_db(norm_freq))
            .sum()
    }
}

impl Processor for QuattroBiQuad {
    fn reset(&mut self) {
        for f in self.sections.iter_mut().flatten() {
            f.reset();
        }
    }
}

// ============ Track EQ ============

/// One track of the EQ module
#[derive(Debug, Clone)]
pub struct TrackEq {
    params: TrackEqParams,
    sample_rate: f64,
    applied: [Option<BandSetting>; N_BANDS],
    filter: QuattroBiQuad,
    gain_db_applied: f64,
    gain_lin: f64,
    redesigns: u64,
}

impl TrackEq {
    pub fn new(sample_rate: f64) -> Self {
        let mut eq = Self {
            params: TrackEqParams::default(),
            sample_rate,
            applied: [None; N_BANDS],
            filter: QuattroBiQuad::new(),
            gain_db_applied: 0.0,
            gain_lin: 1.0,
            redesigns: 0,
        };
        eq.update(&[BandCv::default(); N_BANDS]);
        eq
    }

    #[inline]
    pub fn params(&self) -> &TrackEqParams {
        &self.params
    }

    /// Parameter edits take effect on the next `update`/`process`
    #[inline]
    pub fn params_mut(&mut self) -> &mut TrackEqParams {
        &mut self.params
    }

    pub fn set_params(&mut self, params: TrackEqParams) {
        self.params = params;
    }

    /// Number of band redesigns so far
    #[inline]
    pub fn redesign_count(&self) -> u64 {
        self.redesigns
    }

    /// Bring coefficients in line with params and CV, redesigning changed bands only
    pub fn update(&mut self, cv: &[BandCv; N_BANDS]) {
        for band in 0..N_BANDS {
            let setting = BandSetting::resolve(&self.params, band, &cv[band]);
            if self.applied[band] != Some(setting) {
                self.filter
                    .set_band(band, setting.coeffs(self.sample_rate), setting.active);
                self.applied[band] = Some(setting);
                self.redesigns += 1;
            }
        }
        let gain_db = self.params.gain_db.clamp(-MAX_TRACK_GAIN_DB, MAX_TRACK_GAIN_DB);
        if gain_db != self.gain_db_applied {
            self.gain_db_applied = gain_db;
            self.gain_lin = db_to_linear(gain_db);
        }
    }

    #[inline]
    pub fn process(&mut self, input: StereoSample, stereo: bool, cv: &[BandCv; N_BANDS]) -> StereoSample {
        if !self.params.active {
            return input;
        }
        self.update(cv);
        self.filter.process(input, stereo) * self.gain_lin
    }

    /// Settings currently loaded into the cascade
    pub fn applied_setting(&self, band: usize) -> Option<BandSetting> {
        self.applied[band]
    }

    /// Response in dB at `freq_hz`, from the coefficients in use
    pub fn response_db(&self, freq_hz: f64) -> f64 {
        if !self.params.active {
            return 0.0;
        }
        self.filter.response_db(normalized_freq(freq_hz, self.sample_rate)) + self.gain_db_applied
    }

    /// (Hz, dB) pairs for the display, log-spaced between `min_hz` and `max_hz`
    ///
    /// Band centers are merged into the walk in sorted order so peaks and
    /// shelf corners are always sampled.
    pub fn draw_curve(&self, points: usize, min_hz: f64, max_hz: f64) -> Vec<(f64, f64)> {
        let points = points.max(2);
        let lo = min_hz.max(1.0).log10();
        let hi = max_hz.log10().max(lo + 1e-3);
        let mut band_freqs: Vec<f64> = self
            .applied
            .iter()
            .flatten()
            .filter(|s| s.active && s.freq_hz >= min_hz && s.freq_hz <= max_hz)
            .map(|s| s.freq_hz)
            .collect();
        band_freqs.sort_by(f64::total_cmp);

        let mut curve = Vec::with_capacity(points + band_freqs.len());
        let mut pending = band_freqs.into_iter().peekable();
        for i in 0..points {
            let f = 10.0_f64.powf(lo + (hi - lo) * i as f64 / (points - 1) as f64);
            while let Some(&bf) = pending.peek() {
                if bf >= f {
                    break;
                }
                curve.push((bf, self.response_db(bf)));
                pending.next();
            }
            curve.push((f, self.response_db(f)));
        }
        for bf in pending {
            curve.push((bf, self.response_db(bf)));
        }
        curve.dedup_by(|a, b| a.0 == b.0);
        curve
    }

    pub fn reset(&mut self) {
        self.filter.reset();
    }
}

impl ProcessorConfig for TrackEq {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.applied = [None; N_BANDS];
        self.update(&[BandCv::default(); N_BANDS]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_defaults_are_flat() {
        let eq = TrackEq::new(SR);
        for f in [30.0, 100.0, 1000.0, 10000.0] {
            assert!(eq.response_db(f).abs() < 1e-9);
        }
        assert_eq!(eq.params().band_kind(0), BiquadKind::LowShelf);
        assert_eq!(eq.params().band_kind(3), BiquadKind::HighShelf);
    }

    #[test]
    fn test_peak_mode_flags() {
        let mut params = TrackEqParams::default();
        params.low_peak = true;
        params.high_peak = true;
        for b in 0..N_BANDS {
            assert_eq!(params.band_kind(b), BiquadKind::Peaking);
        }
    }

    #[test]
    fn test_coefficients_redesign_only_on_change() {
        let mut eq = TrackEq::new(SR);
        let base = eq.redesign_count();
        let cv = [BandCv::default(); N_BANDS];
        for _ in 0..100 {
            eq.process(StereoSample::mono(1.0), false, &cv);
        }
        assert_eq!(eq.redesign_count(), base);

        eq.params_mut().bands[1].gain_db = 6.0;
        eq.process(StereoSample::mono(1.0), false, &cv);
        assert_eq!(eq.redesign_count(), base + 1);
        assert!((eq.response_db(500.0) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_cv_moves_band() {
        let mut eq = TrackEq::new(SR);
        eq.params_mut().bands[2].gain_db = 10.0;
        let mut cv = [BandCv::default(); N_BANDS];
        // +1V = one octave up
        cv[2].freq = Some(1.0);
        eq.update(&cv);
        let s = eq.applied_setting(2).unwrap();
        assert!((s.freq_hz - 4000.0).abs() < 1e-6);

        // Gain CV at 50% attenuation: 2 dB/V * 0.5
        eq.params_mut().bands[2].cv_gain_atten = 0.5;
        cv[2].gain = Some(-4.0);
        eq.update(&cv);
        assert!((eq.applied_setting(2).unwrap().gain_db - 6.0).abs() < 1e-12);

        // Q CV is clamped to range
        cv[2].q = Some(100.0);
        eq.update(&cv);
        assert_eq!(eq.applied_setting(2).unwrap().q, MAX_Q);
    }

    #[test]
    fn test_inactive_track_passes_through() {
        let mut eq = TrackEq::new(SR);
        eq.params_mut().bands[0].gain_db = 12.0;
        eq.params_mut().active = false;
        let cv = [BandCv::default(); N_BANDS];
        let x = StereoSample::new(0.3, -0.7);
        assert_eq!(eq.process(x, true, &cv), x);
        assert_eq!(eq.response_db(50.0), 0.0);
    }

    #[test]
    fn test_track_gain() {
        let mut eq = TrackEq::new(SR);
        eq.params_mut().gain_db = -6.0;
        let cv = [BandCv::default(); N_BANDS];
        let y = eq.process(StereoSample::mono(1.0), false, &cv);
        assert!((y.left - db_to_linear(-6.0)).abs() < 1e-9);
        assert!((eq.response_db(1000.0) + 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_draw_curve_contains_sorted_band_centers() {
        let mut eq = TrackEq::new(SR);
        // Deliberately out of order
        eq.params_mut().bands[1].freq_log = 5000.0_f64.log10();
        eq.params_mut().bands[2].freq_log = 300.0_f64.log10();
        eq.params_mut().bands[1].gain_db = 8.0;
        eq.update(&[BandCv::default(); N_BANDS]);

        let curve = eq.draw_curve(64, 20.0, 20000.0);
        assert!(curve.windows(2).all(|w| w[0].0 < w[1].0));
        let at_peak = curve
            .iter()
            .find(|(f, _)| (f - 5000.0).abs() < 1e-6)
            .expect("band center in curve");
        assert!((at_peak.1 - 8.0).abs() < 1e-6);
        let max = curve.iter().map(|p| p.1).fold(f64::MIN, f64::max);
        assert!((max - 8.0).abs() < 1e-6);
    }
}
