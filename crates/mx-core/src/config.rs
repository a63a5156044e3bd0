//! Engine configuration
//!
//! Loaded from JSON. Every struct is `#[serde(default)]` so partial files
//! and files written by older versions load with defaults for the rest.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{DecayRate, MxError, MxResult};

/// Largest supported eco stride
pub const MAX_ECO_STRIDE: usize = 64;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate (Hz)
    pub sample_rate: f64,
    /// Samples between slow-parameter updates (1 = every sample)
    pub eco_stride: usize,
    /// Spectrum analyzer settings
    pub spectrum: SpectrumSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            eco_stride: 4,
            spectrum: SpectrumSettings::default(),
        }
    }
}

/// Spectrum analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumSettings {
    /// FFT page size (power of two)
    pub fft_size: usize,
    /// Display width in pixels
    pub display_width: usize,
    /// Lowest displayed frequency (Hz)
    pub min_freq: f64,
    /// Highest displayed frequency (Hz)
    pub max_freq: f64,
    /// Initial decay speed
    pub decay: DecayRate,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            display_width: 512,
            min_freq: 20.0,
            max_freq: 22000.0,
            decay: DecayRate::Medium,
        }
    }
}

impl EngineConfig {
    /// Parse and validate
    pub fn from_json_str(json: &str) -> MxResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> MxResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        log::info!(
            "Loaded engine config from {} ({} Hz, eco stride {})",
            path.as_ref().display(),
            config.sample_rate,
            config.eco_stride
        );
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MxResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> MxResult<()> {
        if !self.sample_rate.is_finite() || !(8000.0..=768_000.0).contains(&self.sample_rate) {
            log::warn!("Rejecting sample rate {}", self.sample_rate);
            return Err(MxError::InvalidSampleRate(self.sample_rate.max(0.0) as u32));
        }
        if self.eco_stride == 0 || self.eco_stride > MAX_ECO_STRIDE {
            return Err(MxError::Config(format!(
                "eco_stride must be 1..={MAX_ECO_STRIDE}, got {}",
                self.eco_stride
            )));
        }
        self.spectrum.validate()
    }

    #[inline]
    pub fn sample_time(&self) -> f64 {
        1.0 / self.sample_rate
    }
}

impl SpectrumSettings {
    pub fn validate(&self) -> MxResult<()> {
        if !self.fft_size.is_power_of_two() || !(256..=16384).contains(&self.fft_size) {
            return Err(MxError::Config(format!(
                "spectrum.fft_size must be a power of two in 256..=16384, got {}",
                self.fft_size
            )));
        }
        if self.display_width == 0 {
            return Err(MxError::Config("spectrum.display_width must be non-zero".into()));
        }
        if !(self.min_freq > 0.0 && self.max_freq > self.min_freq) {
            return Err(MxError::Config(format!(
                "spectrum frequency range {}..{} is empty",
                self.min_freq, self.max_freq
            )));
        }
        Ok(())
    }
}
