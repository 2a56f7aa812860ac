/// Voice recipes.
///
/// Every sound is synthesized from scratch: `build` turns a `Trigger` into a
/// fresh `VoiceGraph` whose envelopes are scheduled in voice-local time,
/// starting at 0.
use rand::Rng;

use super::graph::{GraphBuilder, VoiceGraph};
use super::node::{CompressorSettings, FilterKind, Waveform, CONVOLUTION_BLOCK};
use super::param::Param;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    Kick,
    Snare,
    HiHat,
    Synth,
    Bass,
    Strings,
    Drop,
}

/// A minor pentatonic scale degrees shared by the melodic voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Note {
    A3,
    C4,
    D4,
    E4,
    G4,
    A4,
}

impl Note {
    pub const ALL: [Note; 6] = [Note::A3, Note::C4, Note::D4, Note::E4, Note::G4, Note::A4];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn frequency(self) -> f32 {
        match self {
            Note::A3 => 220.00,
            Note::C4 => 261.63,
            Note::D4 => 293.66,
            Note::E4 => 329.63,
            Note::G4 => 392.00,
            Note::A4 => 440.00,
        }
    }
}

/// The four drop rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropLength {
    Short,
    Medium,
    Long,
    Extended,
}

impl DropLength {
    pub const ALL: [DropLength; 4] = [
        DropLength::Short,
        DropLength::Medium,
        DropLength::Long,
        DropLength::Extended,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn seconds(self) -> f32 {
        match self {
            DropLength::Short => 0.3,
            DropLength::Medium => 0.6,
            DropLength::Long => 1.0,
            DropLength::Extended => 1.5,
        }
    }
}

/// A fully specified sound request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Kick,
    Snare,
    HiHat,
    Synth(Note),
    Bass(Note),
    Strings(Note),
    Drop { seconds: f32 },
}

impl Trigger {
    pub fn voice(&self) -> Voice {
        match self {
            Trigger::Kick => Voice::Kick,
            Trigger::Snare => Voice::Snare,
            Trigger::HiHat => Voice::HiHat,
            Trigger::Synth(_) => Voice::Synth,
            Trigger::Bass(_) => Voice::Bass,
            Trigger::Strings(_) => Voice::Strings,
            Trigger::Drop { .. } => Voice::Drop,
        }
    }
}

impl From<DropLength> for Trigger {
    fn from(length: DropLength) -> Self {
        Trigger::Drop {
            seconds: length.seconds(),
        }
    }
}

/// Resonance given in dB, as low/high-pass controls usually express it
fn resonance(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Build the signal graph for one trigger
pub fn build<R: Rng + ?Sized>(trigger: Trigger, sample_rate: f32, rng: &mut R) -> VoiceGraph {
    let mut graph = GraphBuilder::new(sample_rate);
    let (stop, end) = match trigger {
        Trigger::Kick => kick(&mut graph),
        Trigger::Snare => snare(&mut graph, rng),
        Trigger::HiHat => hihat(&mut graph, rng),
        Trigger::Synth(note) => synth(&mut graph, note),
        Trigger::Bass(note) => bass(&mut graph, note),
        Trigger::Strings(note) => strings(&mut graph, note, rng),
        Trigger::Drop { seconds } => drop_hit(&mut graph, seconds.max(0.05) as f64, rng),
    };
    graph.build(trigger, stop, end)
}

/// Exponential decay from `from` at 0 to `to` at `duration`
fn decay(from: f32, to: f32, duration: f64) -> Param {
    let mut param = Param::new(from);
    param
        .set_value_at_time(from, 0.0)
        .exponential_ramp_to_value_at_time(to, duration);
    param
}

fn kick(graph: &mut GraphBuilder) -> (f64, f64) {
    let osc = graph.oscillator(Waveform::Sine, decay(150.0, 0.01, 0.5), &[], 0.5);
    let amp = graph.gain(decay(1.0, 0.001, 0.5), &[osc]);
    graph.connect_to_bus(amp);
    (0.5, 0.5)
}

fn snare<R: Rng + ?Sized>(graph: &mut GraphBuilder, rng: &mut R) -> (f64, f64) {
    let noise = graph.white_noise(0.2, rng);
    let amp = graph.gain(decay(1.0, 0.01, 0.2), &[noise]);
    graph.connect_to_bus(amp);
    (0.2, 0.2)
}

fn hihat<R: Rng + ?Sized>(graph: &mut GraphBuilder, rng: &mut R) -> (f64, f64) {
    let noise = graph.white_noise(0.1, rng);
    let highpass = graph.filter(
        FilterKind::HighPass,
        Param::new(8000.0),
        resonance(1.0),
        &[noise],
    );
    let amp = graph.gain(decay(0.3, 0.01, 0.1), &[highpass]);
    graph.connect_to_bus(amp);
    (0.1, 0.1)
}

fn synth(graph: &mut GraphBuilder, note: Note) -> (f64, f64) {
    let osc = graph.oscillator(
        Waveform::Sawtooth,
        Param::new(note.frequency()),
        &[],
        0.3,
    );
    let amp = graph.gain(decay(0.3, 0.001, 0.3), &[osc]);
    graph.connect_to_bus(amp);
    (0.3, 0.3)
}

fn bass(graph: &mut GraphBuilder, note: Note) -> (f64, f64) {
    let osc = graph.oscillator(
        Waveform::Triangle,
        Param::new(note.frequency() / 2.0),
        &[],
        0.4,
    );
    let amp = graph.gain(decay(0.5, 0.001, 0.4), &[osc]);
    graph.connect_to_bus(amp);
    (0.4, 0.4)
}

const STRINGS_DURATION: f64 = 1.2;
const REVERB_SECONDS: f64 = 1.5;

fn strings<R: Rng + ?Sized>(graph: &mut GraphBuilder, note: Note, rng: &mut R) -> (f64, f64) {
    let frequency = note.frequency();

    // vibrato
    let lfo = graph.oscillator(Waveform::Sine, Param::new(6.0), &[], STRINGS_DURATION);
    let depth = graph.gain(Param::new(3.0), &[lfo]);

    let sine = graph.oscillator(
        Waveform::Sine,
        Param::new(frequency),
        &[depth],
        STRINGS_DURATION,
    );
    let triangle = graph.oscillator(
        Waveform::Triangle,
        Param::new(frequency),
        &[depth],
        STRINGS_DURATION,
    );
    let overtone = graph.oscillator(
        Waveform::Sine,
        Param::new(frequency * 2.0),
        &[],
        STRINGS_DURATION,
    );
    let overtone = graph.gain(Param::new(0.15), &[overtone]);

    let mut envelope = Param::new(0.0);
    envelope
        .set_value_at_time(0.0, 0.0)
        .linear_ramp_to_value_at_time(0.35, 0.1)
        .set_value_at_time(0.35, 0.1)
        .exponential_ramp_to_value_at_time(0.3, 0.3)
        .set_value_at_time(0.3, STRINGS_DURATION - 0.5)
        .exponential_ramp_to_value_at_time(0.001, STRINGS_DURATION);
    let amp = graph.gain(envelope, &[sine, triangle, overtone]);

    let lowpass = graph.filter(
        FilterKind::LowPass,
        Param::new(1200.0),
        resonance(0.7),
        &[amp],
    );
    graph.connect_to_bus(lowpass);

    let impulse = reverb_impulse(REVERB_SECONDS, graph.sample_rate(), rng);
    let reverb = graph.convolver(&impulse, &[lowpass]);
    let wet = graph.gain(Param::new(0.25), &[reverb]);
    graph.connect_to_bus(wet);

    let latency = CONVOLUTION_BLOCK as f64 / graph.sample_rate() as f64;
    (STRINGS_DURATION, STRINGS_DURATION + REVERB_SECONDS + latency)
}

fn drop_hit<R: Rng + ?Sized>(graph: &mut GraphBuilder, seconds: f64, rng: &mut R) -> (f64, f64) {
    let full = seconds * 1.5;

    // sub
    let sub = graph.oscillator(Waveform::Sine, decay(55.0, 30.0, seconds), &[], full);
    let mut sub_env = Param::new(0.0);
    sub_env
        .set_value_at_time(0.0, 0.0)
        .linear_ramp_to_value_at_time(0.9, 0.01)
        .exponential_ramp_to_value_at_time(0.001, full);
    let sub = graph.gain(sub_env, &[sub]);

    // mid, with wobble on its frequency
    let wobble_rate = 8.0 + 5.0 / seconds as f32;
    let wobble = graph.oscillator(Waveform::Sine, Param::new(wobble_rate), &[], full);
    let wobble = graph.gain(Param::new(50.0), &[wobble]);

    let mid = graph.oscillator(
        Waveform::Sawtooth,
        decay(110.0, 55.0, seconds * 0.8),
        &[wobble],
        full,
    );
    let mut sweep = Param::new(8000.0);
    sweep
        .set_value_at_time(8000.0, 0.0)
        .exponential_ramp_to_value_at_time(800.0, seconds * 0.1)
        .exponential_ramp_to_value_at_time(100.0, seconds);
    let mid = graph.filter(FilterKind::LowPass, sweep, resonance(8.0), &[mid]);
    let mut mid_env = Param::new(0.0);
    mid_env
        .set_value_at_time(0.0, 0.0)
        .linear_ramp_to_value_at_time(0.6, 0.01)
        .exponential_ramp_to_value_at_time(0.001, seconds * 0.9);
    let mid = graph.gain(mid_env, &[mid]);

    // noise burst
    let noise = graph.white_noise(full, rng);
    let noise = graph.filter(FilterKind::BandPass, Param::new(2000.0), 1.0, &[noise]);
    let noise = graph.gain(decay(0.3, 0.001, seconds * 0.3), &[noise]);

    let compressed = graph.compressor(
        CompressorSettings {
            threshold_db: -24.0,
            knee_db: 4.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        },
        &[sub, mid, noise],
    );
    let echo = graph.feedback_delay(0.1, 0.3, 1000.0, &[compressed]);

    let mut master = Param::new(0.9);
    master
        .set_value_at_time(0.9, (full - 0.05).max(0.0))
        .linear_ramp_to_value_at_time(0.0, full);
    let master = graph.gain(master, &[compressed, echo]);
    graph.connect_to_bus(master);

    (full, full)
}

/// Decaying noise impulse response, scaled to a fixed energy the way
/// browser convolvers normalize their buffers.
pub fn reverb_impulse<R: Rng + ?Sized>(seconds: f64, sample_rate: f32, rng: &mut R) -> Vec<f32> {
    const GAIN_CALIBRATION: f32 = 0.00125;
    const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
    const MIN_POWER: f32 = 0.000125;

    let len = (seconds * sample_rate as f64).round() as usize;
    let mut impulse: Vec<f32> = (0..len)
        .map(|i| {
            let decay = (1.0 - i as f32 / len as f32).powi(2);
            rng.gen_range(-1.0f32..1.0) * decay
        })
        .collect();

    if impulse.is_empty() {
        return impulse;
    }

    let power = impulse.iter().map(|s| s * s).sum::<f32>() / len as f32;
    let rms = power.sqrt().max(MIN_POWER);
    let scale = GAIN_CALIBRATION / rms * GAIN_CALIBRATION_SAMPLE_RATE / sample_rate;
    for sample in &mut impulse {
        *sample *= scale;
    }
    impulse
}
