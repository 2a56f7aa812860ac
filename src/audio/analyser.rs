/// Spectrum analysis of the output bus
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::AnalyserConfig;

/// Normalized band energies (0.0-1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spectrum {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Windowed FFT over the most recent output samples, with per-bin
/// temporal smoothing and a dB-to-byte mapping.
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl Analyser {
    pub fn new(config: &AnalyserConfig) -> Self {
        let size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        // Blackman
        let window = (0..size)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / size as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            history: vec![0.0; size],
            write_pos: 0,
            smoothed: vec![0.0; config.bin_count()],
            bytes: vec![0; config.bin_count()],
            scratch: vec![Complex::new(0.0, 0.0); size],
            smoothing: config.smoothing,
            min_db: config.min_db,
            max_db: config.max_db,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Feed one output sample
    pub fn push(&mut self, sample: f32) {
        self.history[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.history.len();
    }

    /// Take a new frequency frame and map it to bytes over [min_db, max_db]
    pub fn byte_frequency_data(&mut self) -> &[u8] {
        let size = self.history.len();

        // oldest sample first
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = self.history[(self.write_pos + i) % size];
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let range = self.max_db - self.min_db;
        let norm = 1.0 / size as f32;
        for ((smoothed, byte), bin) in self
            .smoothed
            .iter_mut()
            .zip(self.bytes.iter_mut())
            .zip(&self.scratch)
        {
            let magnitude = bin.norm() * norm;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let db = 20.0 * smoothed.max(1e-12).log10();
            let scaled = 255.0 * (db - self.min_db) / range;
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }

        &self.bytes
    }

    /// Bass, mid and treble averages of a fresh frame
    pub fn spectrum(&mut self) -> Spectrum {
        let bins = self.bin_count();
        let (bass_end, mid_end) = (bins / 4, bins * 3 / 4);
        let data = self.byte_frequency_data();

        let average = |range: &[u8]| {
            if range.is_empty() {
                0.0
            } else {
                range.iter().map(|&b| b as f32).sum::<f32>() / range.len() as f32 / 255.0
            }
        };

        Spectrum {
            bass: average(&data[..bass_end]),
            mid: average(&data[bass_end..mid_end]),
            treble: average(&data[mid_end..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> Analyser {
        Analyser::new(&AnalyserConfig::default())
    }

    #[test]
    fn test_silence_reads_zero() {
        let mut analyser = analyser();
        for _ in 0..512 {
            analyser.push(0.0);
        }
        assert_eq!(analyser.spectrum(), Spectrum::default());
    }

    #[test]
    fn test_low_tone_lands_in_bass_band() {
        let mut analyser = analyser();
        // bin 10 of a 256-point frame
        let frequency = 44100.0 / 256.0 * 10.0;
        for i in 0..256 {
            let t = i as f32 / 44100.0;
            analyser.push(0.5 * (2.0 * PI * frequency * t).sin());
        }
        let spectrum = analyser.spectrum();
        assert!(spectrum.bass > 0.1, "{spectrum:?}");
        assert!(spectrum.bass > spectrum.treble * 5.0, "{spectrum:?}");
    }

    #[test]
    fn test_smoothing_carries_previous_frames() {
        let mut analyser = analyser();
        for i in 0..256 {
            analyser.push(if i % 2 == 0 { 0.8 } else { -0.8 });
        }
        let loud = analyser.spectrum();
        for _ in 0..256 {
            analyser.push(0.0);
        }
        let after = analyser.spectrum();
        assert!(after.treble > 0.0);
        assert!(after.treble <= loud.treble);
    }

    #[test]
    fn test_byte_data_has_one_entry_per_bin() {
        let mut analyser = analyser();
        assert_eq!(analyser.byte_frequency_data().len(), 128);
    }
}
