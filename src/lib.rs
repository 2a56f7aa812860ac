/// GrooveBox - a procedural 16-step groove sequencer
///
/// This library provides the synthesis and transport engine:
/// - Automatable parameters and per-trigger voice graphs (no samples)
/// - A shared output bus with a spectrum analyser tap
/// - A copy-on-write pattern store edited live while playing
/// - A drift-free transport clock with retunable tempo
pub mod audio;
pub mod config;
pub mod error;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioEngine, DropLength, EngineState, Note, OutputBus, Spectrum, Trigger, Voice};
pub use config::{AnalyserConfig, Config, SequencerConfig};
pub use error::{Error, Result};
pub use sequencer::playback::{PlaybackEngine, PlaybackEvent, TransportState};
pub use sequencer::{Drum, Instrument, Pattern, PatternStore, Row, Sequencer, STEPS};
