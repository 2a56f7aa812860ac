/// Engine and sequencer configuration
use crate::error::{Error, Result};

pub const MIN_TEMPO: f32 = 60.0;
pub const MAX_TEMPO: f32 = 200.0;
pub const DEFAULT_TEMPO: f32 = 120.0;
pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub analyser: AnalyserConfig,
    pub sequencer: SequencerConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.analyser.validate()?;
        self.sequencer.validate()
    }
}

/// Spectrum analyser and output gain settings
#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// FFT size in samples; yields `fft_size / 2` frequency bins
    pub fft_size: usize,
    /// Weight of the previous frame when smoothing magnitudes (0.0-1.0)
    pub smoothing: f32,
    /// Magnitude mapped to byte value 0
    pub min_db: f32,
    /// Magnitude mapped to byte value 255
    pub max_db: f32,
    /// Duration of the exponential ramp applied on volume changes
    pub volume_ramp_secs: f64,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            volume_ramp_secs: 0.02,
        }
    }
}

impl AnalyserConfig {
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(Error::InvalidConfig(format!(
                "fft size must be a power of two in 32..=32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::InvalidConfig(format!(
                "smoothing must be within 0..=1, got {}",
                self.smoothing
            )));
        }
        if self.min_db >= self.max_db {
            return Err(Error::InvalidConfig(format!(
                "min_db ({}) must be below max_db ({})",
                self.min_db, self.max_db
            )));
        }
        if self.volume_ramp_secs <= 0.0 {
            return Err(Error::InvalidConfig("volume ramp must be positive".into()));
        }
        Ok(())
    }
}

/// Startup state of the sequencer
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub tempo: f32,
    pub volume: f32,
    /// Demo preset loaded at startup
    pub demo_index: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            volume: DEFAULT_VOLUME,
            demo_index: 3,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&self.tempo) {
            return Err(Error::InvalidConfig(format!(
                "tempo must be within {MIN_TEMPO}..={MAX_TEMPO} BPM, got {}",
                self.tempo
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::InvalidConfig(format!(
                "volume must be within 0..=1, got {}",
                self.volume
            )));
        }
        if self.demo_index >= crate::sequencer::demo::DEMOS.len() {
            return Err(Error::InvalidConfig(format!(
                "demo index {} out of range",
                self.demo_index
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(AnalyserConfig::default().bin_count(), 128);
    }

    #[test]
    fn test_rejects_out_of_range_tempo() {
        let config = SequencerConfig {
            tempo: 240.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_fft_size() {
        let config = AnalyserConfig {
            fft_size: 300,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
