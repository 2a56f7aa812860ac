/// Processing nodes for per-voice signal graphs.
///
/// Every node produces one sample per tick. Inputs are referenced by `NodeId`
/// and always point at nodes added earlier, so a graph evaluates front to
/// back; multiple inputs are summed.
use std::f64::consts::TAU;
use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use rand::Rng;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::param::Param;

pub type NodeId = usize;

/// Partition length of the convolution reverb; also its latency in samples
pub const CONVOLUTION_BLOCK: usize = 512;

fn mix(inputs: &[NodeId], upstream: &[f32]) -> f32 {
    inputs.iter().map(|&id| upstream[id]).sum()
}

pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-6).log10()
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub enum Node {
    Oscillator(Oscillator),
    Noise(Noise),
    Filter(Filter),
    Gain(Gain),
    Compressor(Compressor),
    FeedbackDelay(FeedbackDelay),
    Convolver(Convolver),
}

impl Node {
    /// `upstream` holds this sample's outputs of every node added before this one
    pub fn tick(&mut self, time: f64, upstream: &[f32]) -> f32 {
        match self {
            Node::Oscillator(node) => node.tick(time, upstream),
            Node::Noise(node) => node.tick(),
            Node::Filter(node) => node.tick(time, upstream),
            Node::Gain(node) => node.tick(time, upstream),
            Node::Compressor(node) => node.tick(upstream),
            Node::FeedbackDelay(node) => node.tick(upstream),
            Node::Convolver(node) => node.tick(upstream),
        }
    }

    /// Ids this node reads from, including frequency modulators
    pub fn inputs(&self) -> &[NodeId] {
        match self {
            Node::Oscillator(node) => &node.modulators,
            Node::Noise(_) => &[],
            Node::Filter(node) => &node.inputs,
            Node::Gain(node) => &node.inputs,
            Node::Compressor(node) => &node.inputs,
            Node::FeedbackDelay(node) => &node.inputs,
            Node::Convolver(node) => &node.inputs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
    Triangle,
}

pub struct Oscillator {
    waveform: Waveform,
    frequency: Param,
    modulators: Vec<NodeId>,
    stop: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(
        waveform: Waveform,
        frequency: Param,
        modulators: &[NodeId],
        stop: f64,
        sample_rate: f32,
    ) -> Self {
        Self {
            waveform,
            frequency,
            modulators: modulators.to_vec(),
            stop,
            phase: 0.0,
            sample_rate: sample_rate as f64,
        }
    }

    fn tick(&mut self, time: f64, upstream: &[f32]) -> f32 {
        if time >= self.stop {
            return 0.0;
        }

        let frequency = self.frequency.value_at(time) + mix(&self.modulators, upstream);
        let increment = frequency as f64 / self.sample_rate;
        let phase = self.phase;

        let out = match self.waveform {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Sawtooth => {
                // rises from 0, wraps at half period
                let shifted = (phase + 0.5).fract();
                2.0 * shifted - 1.0 - poly_blep(shifted, increment.abs())
            }
            Waveform::Triangle => 1.0 - 4.0 * ((phase + 0.25).fract() - 0.5).abs(),
        };

        self.phase = (phase + increment).rem_euclid(1.0);
        out as f32
    }
}

/// Band-limiting correction around a sawtooth discontinuity
fn poly_blep(phase: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return 0.0;
    }
    if phase < increment {
        let t = phase / increment;
        2.0 * t - t * t - 1.0
    } else if phase > 1.0 - increment {
        let t = (phase - 1.0) / increment;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

/// One-shot playback of a prerendered noise buffer
pub struct Noise {
    buffer: Vec<f32>,
    position: usize,
}

impl Noise {
    pub fn white<R: Rng + ?Sized>(seconds: f64, sample_rate: f32, rng: &mut R) -> Self {
        let len = (seconds * sample_rate as f64).round() as usize;
        Self {
            buffer: (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect(),
            position: 0,
        }
    }

    fn tick(&mut self) -> f32 {
        let out = self.buffer.get(self.position).copied().unwrap_or(0.0);
        self.position = self.position.saturating_add(1);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
}

/// Biquad filter with an automatable cutoff/center frequency
pub struct Filter {
    kind: FilterKind,
    inputs: Vec<NodeId>,
    frequency: Param,
    q: f32,
    sample_rate: f32,
    filter: DirectForm2Transposed<f32>,
    last_frequency: f32,
}

impl Filter {
    pub fn new(
        kind: FilterKind,
        frequency: Param,
        q: f32,
        inputs: &[NodeId],
        sample_rate: f32,
    ) -> Self {
        let mut filter = Self {
            kind,
            inputs: inputs.to_vec(),
            frequency,
            q,
            sample_rate,
            filter: DirectForm2Transposed::<f32>::new(passthrough()),
            last_frequency: f32::NAN,
        };
        filter.retune(filter.frequency.value_at(0.0));
        filter
    }

    fn retune(&mut self, frequency: f32) {
        let frequency = frequency.clamp(10.0, self.sample_rate * 0.5 * 0.99);
        if (frequency - self.last_frequency).abs() < 0.01 {
            return;
        }

        let response = match self.kind {
            FilterKind::LowPass => Type::LowPass,
            FilterKind::HighPass => Type::HighPass,
            FilterKind::BandPass => Type::BandPass,
        };

        // an invalid request keeps the previous response
        if let Ok(coeffs) = Coefficients::<f32>::from_params(
            response,
            self.sample_rate.hz(),
            frequency.hz(),
            self.q,
        ) {
            self.filter.update_coefficients(coeffs);
            self.last_frequency = frequency;
        }
    }

    fn tick(&mut self, time: f64, upstream: &[f32]) -> f32 {
        let frequency = self.frequency.value_at(time);
        self.retune(frequency);
        self.filter.run(mix(&self.inputs, upstream))
    }
}

fn passthrough() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Sums its inputs and scales them by an automatable gain
pub struct Gain {
    inputs: Vec<NodeId>,
    gain: Param,
}

impl Gain {
    pub fn new(gain: Param, inputs: &[NodeId]) -> Self {
        Self {
            inputs: inputs.to_vec(),
            gain,
        }
    }

    fn tick(&mut self, time: f64, upstream: &[f32]) -> f32 {
        mix(&self.inputs, upstream) * self.gain.value_at(time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub release: f32,
}

impl CompressorSettings {
    /// Static curve: output level for an input level, both in dB
    pub fn curve(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        if 2.0 * over < -self.knee_db {
            level_db
        } else if 2.0 * over.abs() <= self.knee_db {
            let x = over + self.knee_db / 2.0;
            level_db + (1.0 / self.ratio - 1.0) * x * x / (2.0 * self.knee_db)
        } else {
            self.threshold_db + over / self.ratio
        }
    }

    /// Automatic makeup gain in dB, derived from the reduction at full scale
    pub fn makeup_db(&self) -> f32 {
        -0.6 * self.curve(0.0)
    }
}

/// Feed-forward peak compressor with a soft knee
pub struct Compressor {
    inputs: Vec<NodeId>,
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_db: f32,
    envelope_db: f32,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, inputs: &[NodeId], sample_rate: f32) -> Self {
        Self {
            inputs: inputs.to_vec(),
            settings,
            attack_coeff: (-1.0 / (settings.attack * sample_rate)).exp(),
            release_coeff: (-1.0 / (settings.release * sample_rate)).exp(),
            makeup_db: settings.makeup_db(),
            envelope_db: 0.0,
        }
    }

    fn tick(&mut self, upstream: &[f32]) -> f32 {
        let input = mix(&self.inputs, upstream);
        let level_db = gain_to_db(input.abs());
        let reduction = self.settings.curve(level_db) - level_db;

        let coeff = if reduction < self.envelope_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * reduction;

        input * db_to_gain(self.envelope_db + self.makeup_db)
    }
}

/// Delay line whose output is low-passed, scaled and fed back into itself.
/// Emits only the fed-back (wet) signal.
pub struct FeedbackDelay {
    inputs: Vec<NodeId>,
    line: Vec<f32>,
    position: usize,
    feedback: f32,
    damping: DirectForm2Transposed<f32>,
}

impl FeedbackDelay {
    pub fn new(
        delay: f64,
        feedback: f32,
        damping_hz: f32,
        inputs: &[NodeId],
        sample_rate: f32,
    ) -> Self {
        let len = ((delay * sample_rate as f64).round() as usize).max(1);
        let coeffs = Coefficients::<f32>::from_params(
            Type::LowPass,
            sample_rate.hz(),
            damping_hz.min(sample_rate * 0.45).hz(),
            biquad::Q_BUTTERWORTH_F32,
        )
        .unwrap_or_else(|_| passthrough());

        Self {
            inputs: inputs.to_vec(),
            line: vec![0.0; len],
            position: 0,
            feedback,
            damping: DirectForm2Transposed::<f32>::new(coeffs),
        }
    }

    fn tick(&mut self, upstream: &[f32]) -> f32 {
        let delayed = self.line[self.position];
        let wet = self.feedback * self.damping.run(delayed);
        self.line[self.position] = mix(&self.inputs, upstream) + wet;
        self.position = (self.position + 1) % self.line.len();
        wet
    }
}

/// Uniformly partitioned overlap-save convolution.
///
/// Output lags the input by `CONVOLUTION_BLOCK` samples.
pub struct Convolver {
    inputs: Vec<NodeId>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    partitions: Vec<Vec<Complex<f32>>>,
    // input spectra, newest at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    window: Vec<f32>,
    output: Vec<f32>,
    position: usize,
    scratch: Vec<f32>,
    accumulator: Vec<Complex<f32>>,
}

impl Convolver {
    pub fn new(impulse: &[f32], inputs: &[NodeId]) -> Self {
        let size = 2 * CONVOLUTION_BLOCK;
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);

        let mut partitions: Vec<Vec<Complex<f32>>> = impulse
            .chunks(CONVOLUTION_BLOCK)
            .map(|chunk| {
                let mut padded = forward.make_input_vec();
                padded[..chunk.len()].copy_from_slice(chunk);
                let mut spectrum = forward.make_output_vec();
                let result = forward.process(&mut padded, &mut spectrum);
                debug_assert!(result.is_ok(), "impulse partition size mismatch");
                spectrum
            })
            .collect();
        if partitions.is_empty() {
            partitions.push(forward.make_output_vec());
        }

        let history = vec![forward.make_output_vec(); partitions.len()];
        let accumulator = forward.make_output_vec();

        Self {
            inputs: inputs.to_vec(),
            partitions,
            history,
            head: 0,
            window: vec![0.0; size],
            output: vec![0.0; CONVOLUTION_BLOCK],
            position: 0,
            scratch: vec![0.0; size],
            accumulator,
            forward,
            inverse,
        }
    }

    fn tick(&mut self, upstream: &[f32]) -> f32 {
        let out = self.output[self.position];
        self.window[CONVOLUTION_BLOCK + self.position] = mix(&self.inputs, upstream);
        self.position += 1;
        if self.position == CONVOLUTION_BLOCK {
            self.process_block();
            self.position = 0;
        }
        out
    }

    fn process_block(&mut self) {
        let slots = self.history.len();
        self.head = (self.head + slots - 1) % slots;

        self.scratch.copy_from_slice(&self.window);
        let result = self
            .forward
            .process(&mut self.scratch, &mut self.history[self.head]);
        debug_assert!(result.is_ok(), "forward block size mismatch");

        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (k, partition) in self.partitions.iter().enumerate() {
            let spectrum = &self.history[(self.head + k) % slots];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(spectrum).zip(partition) {
                *acc += *x * *h;
            }
        }

        // DC and Nyquist bins of a real signal carry no imaginary part
        if let Some(first) = self.accumulator.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.accumulator.last_mut() {
            last.im = 0.0;
        }
        let result = self
            .inverse
            .process(&mut self.accumulator, &mut self.scratch);
        debug_assert!(result.is_ok(), "inverse block size mismatch");

        let norm = 1.0 / self.scratch.len() as f32;
        for (out, sample) in self
            .output
            .iter_mut()
            .zip(&self.scratch[CONVOLUTION_BLOCK..])
        {
            *out = sample * norm;
        }

        self.window.copy_within(CONVOLUTION_BLOCK.., 0);
    }
}
