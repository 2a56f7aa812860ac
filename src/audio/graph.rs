/// Per-trigger signal graphs.
///
/// A `GraphBuilder` assembles nodes in evaluation order; the resulting
/// `VoiceGraph` is owned by the mixer until its end time has passed.
use rand::Rng;

use super::node::{
    Compressor, CompressorSettings, Convolver, FeedbackDelay, Filter, FilterKind, Gain, Node,
    NodeId, Noise, Oscillator, Waveform,
};
use super::param::Param;
use super::voice::Trigger;

pub struct GraphBuilder {
    sample_rate: f32,
    nodes: Vec<Node>,
    bus_inputs: Vec<NodeId>,
}

impl GraphBuilder {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            nodes: Vec::new(),
            bus_inputs: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn push(&mut self, node: Node) -> NodeId {
        debug_assert!(
            node.inputs().iter().all(|&id| id < self.nodes.len()),
            "inputs must be added before the node reading them"
        );
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Oscillator running from voice time 0 until `stop`. Outputs of
    /// `modulators` are added to its frequency in Hz.
    pub fn oscillator(
        &mut self,
        waveform: Waveform,
        frequency: Param,
        modulators: &[NodeId],
        stop: f64,
    ) -> NodeId {
        let node = Oscillator::new(waveform, frequency, modulators, stop, self.sample_rate);
        self.push(Node::Oscillator(node))
    }

    pub fn white_noise<R: Rng + ?Sized>(&mut self, seconds: f64, rng: &mut R) -> NodeId {
        let node = Noise::white(seconds, self.sample_rate, rng);
        self.push(Node::Noise(node))
    }

    pub fn filter(
        &mut self,
        kind: FilterKind,
        frequency: Param,
        q: f32,
        inputs: &[NodeId],
    ) -> NodeId {
        let node = Filter::new(kind, frequency, q, inputs, self.sample_rate);
        self.push(Node::Filter(node))
    }

    pub fn gain(&mut self, gain: Param, inputs: &[NodeId]) -> NodeId {
        self.push(Node::Gain(Gain::new(gain, inputs)))
    }

    pub fn compressor(&mut self, settings: CompressorSettings, inputs: &[NodeId]) -> NodeId {
        let node = Compressor::new(settings, inputs, self.sample_rate);
        self.push(Node::Compressor(node))
    }

    pub fn feedback_delay(
        &mut self,
        delay: f64,
        feedback: f32,
        damping_hz: f32,
        inputs: &[NodeId],
    ) -> NodeId {
        let node = FeedbackDelay::new(delay, feedback, damping_hz, inputs, self.sample_rate);
        self.push(Node::FeedbackDelay(node))
    }

    pub fn convolver(&mut self, impulse: &[f32], inputs: &[NodeId]) -> NodeId {
        self.push(Node::Convolver(Convolver::new(impulse, inputs)))
    }

    /// Route a node's output to the shared output bus
    pub fn connect_to_bus(&mut self, id: NodeId) {
        if !self.bus_inputs.contains(&id) {
            self.bus_inputs.push(id);
        }
    }

    /// `stop_time` is when the sound sources stop, `end_time` when the
    /// graph may be discarded (sources plus any effect tail).
    pub fn build(self, trigger: Trigger, stop_time: f64, end_time: f64) -> VoiceGraph {
        let len = self.nodes.len();
        VoiceGraph {
            trigger,
            nodes: self.nodes,
            outputs: vec![0.0; len],
            bus_inputs: self.bus_inputs,
            stop_time,
            end_time: end_time.max(stop_time),
            sample_rate: self.sample_rate,
            position: 0,
        }
    }
}

/// A self-contained voice: nodes in evaluation order plus the subset
/// feeding the output bus.
pub struct VoiceGraph {
    trigger: Trigger,
    nodes: Vec<Node>,
    outputs: Vec<f32>,
    bus_inputs: Vec<NodeId>,
    stop_time: f64,
    end_time: f64,
    sample_rate: f32,
    position: u64,
}

impl VoiceGraph {
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Voice-local time of the next sample
    pub fn elapsed(&self) -> f64 {
        self.position as f64 / self.sample_rate as f64
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed() >= self.end_time
    }

    /// Render the next sample of the bus contribution
    pub fn tick(&mut self) -> f32 {
        let time = self.elapsed();
        for i in 0..self.nodes.len() {
            let (upstream, rest) = self.outputs.split_at_mut(i);
            rest[0] = self.nodes[i].tick(time, upstream);
        }
        self.position += 1;

        self.bus_inputs.iter().map(|&id| self.outputs[id]).sum()
    }

    /// Render `frames` samples into a fresh buffer
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        (0..frames).map(|_| self.tick()).collect()
    }
}
