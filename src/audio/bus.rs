/// Shared output bus: every voice is mixed here, scaled by the master gain
/// and tapped by the analyser before reaching the device.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::analyser::{Analyser, Spectrum};
use super::graph::VoiceGraph;
use super::param::Param;
use super::voice::{self, Trigger};
use super::EngineState;
use crate::config::{AnalyserConfig, DEFAULT_VOLUME};

/// Floor for exponential gain ramps, which cannot reach zero
pub const MIN_GAIN: f32 = 0.0001;

const FALLBACK_SAMPLE_RATE: f32 = 44100.0;

/// Cloneable handle to the mixer shared by the device callback, the
/// transport clock and the UI.
#[derive(Clone)]
pub struct OutputBus {
    mixer: Arc<Mutex<Mixer>>,
}

struct Mixer {
    state: EngineState,
    sample_rate: f32,
    // engine clock, in rendered frames
    frames: u64,
    voices: Vec<VoiceGraph>,
    gain: Param,
    volume: f32,
    volume_ramp: f64,
    analyser: Analyser,
}

impl OutputBus {
    /// A bus with no device behind it; triggers are ignored until activated
    pub fn new(config: &AnalyserConfig) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer {
                state: EngineState::Uninitialized,
                sample_rate: FALLBACK_SAMPLE_RATE,
                frames: 0,
                voices: Vec::new(),
                gain: Param::new(1.0),
                volume: DEFAULT_VOLUME,
                volume_ramp: config.volume_ramp_secs,
                analyser: Analyser::new(config),
            })),
        }
    }

    /// An active bus rendered by the caller instead of a device
    pub fn offline(sample_rate: f32) -> Self {
        let bus = Self::new(&AnalyserConfig::default());
        bus.activate(sample_rate);
        bus
    }

    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn activate(&self, sample_rate: f32) {
        let mut mixer = self.mixer();
        mixer.sample_rate = sample_rate;
        mixer.state = EngineState::Active;
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.mixer().state = state;
    }

    pub fn state(&self) -> EngineState {
        self.mixer().state
    }

    pub fn sample_rate(&self) -> f32 {
        self.mixer().sample_rate
    }

    /// Engine time in seconds
    pub fn now(&self) -> f64 {
        self.mixer().now()
    }

    pub fn volume(&self) -> f32 {
        self.mixer().volume
    }

    /// Retarget the master gain. While active, the current value is held and
    /// ramped exponentially to the new volume; otherwise it is set directly.
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let mut mixer = self.mixer();
        mixer.volume = volume;

        if mixer.state == EngineState::Active {
            let now = mixer.now();
            let end = now + mixer.volume_ramp;
            mixer
                .gain
                .hold_at(now)
                .exponential_ramp_to_value_at_time(volume.max(MIN_GAIN), end);
        } else {
            mixer.gain.set_value(volume);
        }
        debug!(volume, "master volume");
    }

    /// Schedule a fresh voice starting at the next rendered frame
    pub fn trigger(&self, trigger: Trigger) {
        let sample_rate = {
            let mixer = self.mixer();
            if mixer.state == EngineState::Uninitialized {
                trace!(?trigger, "no output, trigger dropped");
                return;
            }
            mixer.sample_rate
        };

        // synthesis setup happens outside the lock
        let graph = voice::build(trigger, sample_rate, &mut rand::thread_rng());
        trace!(voice = ?trigger.voice(), end = graph.end_time(), "voice scheduled");
        self.mixer().voices.push(graph);
    }

    /// Number of voices still sounding or waiting to sound
    pub fn active_voices(&self) -> usize {
        self.mixer().voices.len()
    }

    /// Triggers of the voices currently held by the mixer, oldest first
    pub fn active_triggers(&self) -> Vec<Trigger> {
        self.mixer().voices.iter().map(VoiceGraph::trigger).collect()
    }

    /// Bass/mid/treble energy of the latest output; zero without a device
    pub fn spectrum(&self) -> Spectrum {
        let mut mixer = self.mixer();
        if mixer.state == EngineState::Uninitialized {
            return Spectrum::default();
        }
        mixer.analyser.spectrum()
    }

    /// Per-bin magnitudes scaled to 0-255
    pub fn frequency_data(&self) -> Vec<u8> {
        let mut mixer = self.mixer();
        if mixer.state == EngineState::Uninitialized {
            return vec![0; mixer.analyser.bin_count()];
        }
        mixer.analyser.byte_frequency_data().to_vec()
    }

    /// Fill an interleaved buffer. Only an active bus advances its clock;
    /// otherwise the buffer is silenced.
    pub fn render<T>(&self, output: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        self.mixer().render(output, channels);
    }
}

impl Mixer {
    fn now(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    fn render<T>(&mut self, output: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        if self.state != EngineState::Active || channels == 0 {
            for sample in output.iter_mut() {
                *sample = T::from_sample(0.0f32);
            }
            return;
        }

        for frame in output.chunks_mut(channels) {
            let time = self.now();
            let mixed: f32 = self.voices.iter_mut().map(VoiceGraph::tick).sum();
            let out = mixed * self.gain.value_at(time);

            self.analyser.push(out);

            // hard limit, mono to every channel
            let out = out.clamp(-1.0, 1.0);
            for channel in frame.iter_mut() {
                *channel = T::from_sample(out);
            }
            self.frames += 1;
        }

        let before = self.voices.len();
        self.voices.retain(|voice| !voice.is_finished());
        if self.voices.len() != before {
            trace!(reaped = before - self.voices.len(), "voices finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::param::Ramp;
    use crate::audio::voice::Note;

    #[test]
    fn test_uninitialized_bus_ignores_triggers() {
        let bus = OutputBus::new(&AnalyserConfig::default());
        bus.trigger(Trigger::Kick);
        assert_eq!(bus.active_voices(), 0);
        assert_eq!(bus.spectrum(), Spectrum::default());
        assert!(bus.frequency_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_volume_ramps_to_floor() {
        let bus = OutputBus::offline(44100.0);
        bus.set_volume(0.0);
        assert_eq!(bus.volume(), 0.0);

        let mixer = bus.mixer();
        let last = mixer.gain.events().last().copied();
        let last = last.expect("ramp scheduled");
        assert_eq!(last.ramp, Ramp::Exponential);
        assert_eq!(last.value, MIN_GAIN);
        assert!((last.time - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_bus_assigns_volume_directly() {
        let bus = OutputBus::new(&AnalyserConfig::default());
        bus.set_volume(0.0);
        let mixer = bus.mixer();
        assert!(mixer.gain.events().is_empty());
        assert_eq!(mixer.gain.value_at(0.0), 0.0);
    }

    #[test]
    fn test_volume_ramp_starts_from_current_gain() {
        let bus = OutputBus::offline(1000.0);
        bus.set_volume(0.5);
        let mut buffer = vec![0.0f32; 100];
        bus.render(&mut buffer, 1);

        bus.set_volume(1.0);
        let mixer = bus.mixer();
        let events = mixer.gain.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ramp, Ramp::Step);
        assert!((events[0].value - 0.5).abs() < 1e-6);
        assert!((events[0].time - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_finished_voices_are_reaped() {
        let bus = OutputBus::offline(44100.0);
        bus.trigger(Trigger::HiHat);
        bus.trigger(Trigger::Synth(Note::C4));
        assert_eq!(bus.active_voices(), 2);

        let mut buffer = vec![0.0f32; 2 * 4410];
        bus.render(&mut buffer, 2);
        assert_eq!(bus.active_triggers(), vec![Trigger::Synth(Note::C4)]);

        let mut buffer = vec![0.0f32; 2 * 8820];
        bus.render(&mut buffer, 2);
        assert_eq!(bus.active_voices(), 0);
    }

    #[test]
    fn test_output_is_limited_and_duplicated_across_channels() {
        let bus = OutputBus::offline(44100.0);
        for _ in 0..8 {
            bus.trigger(Trigger::Kick);
        }
        let mut buffer = vec![0.0f32; 2 * 2048];
        bus.render(&mut buffer, 2);

        assert!(buffer.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(buffer.chunks(2).all(|frame| frame[0] == frame[1]));
        assert!(buffer.iter().any(|&s| s.abs() > 0.5));
    }

    #[test]
    fn test_suspended_bus_holds_time() {
        let bus = OutputBus::offline(44100.0);
        bus.trigger(Trigger::Kick);
        bus.set_state(EngineState::Suspended);

        let mut buffer = vec![1.0f32; 512];
        bus.render(&mut buffer, 1);
        assert!(buffer.iter().all(|&s| s == 0.0));
        assert_eq!(bus.now(), 0.0);
        assert_eq!(bus.active_voices(), 1);
    }

    #[test]
    fn test_spectrum_follows_output() {
        let bus = OutputBus::offline(44100.0);
        bus.trigger(Trigger::Bass(Note::A3));
        let mut buffer = vec![0.0f32; 1024];
        bus.render(&mut buffer, 1);

        let spectrum = bus.spectrum();
        assert!(spectrum.bass > 0.1, "{spectrum:?}");
        assert!(spectrum.bass > spectrum.treble);
    }
}
