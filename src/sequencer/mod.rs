/// Sequencer - pattern editing, demos and transport behind one handle
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::OutputBus;
use crate::config::SequencerConfig;

pub mod demo;
pub mod pattern;
pub mod playback;

pub use demo::{Demo, DemoLibrary, DEMOS};
pub use pattern::{Drum, Grid, Instrument, Pattern, PatternStore, Row, STEPS};
pub use playback::{step_interval, PlaybackEngine, PlaybackEvent, TransportState};

pub struct Sequencer {
    store: Arc<PatternStore>,
    playback: PlaybackEngine,
    demos: DemoLibrary,
    bus: OutputBus,
}

impl Sequencer {
    /// Starts stopped, with the configured demo loaded
    pub fn new(bus: OutputBus, config: &SequencerConfig) -> Self {
        let demos = DemoLibrary::new(config.demo_index);
        let store = Arc::new(PatternStore::new(demos.current().pattern()));
        let playback = PlaybackEngine::new(Arc::clone(&store), bus.clone(), config.tempo);

        Self {
            store,
            playback,
            demos,
            bus,
        }
    }

    pub fn bus(&self) -> &OutputBus {
        &self.bus
    }

    pub fn pattern(&self) -> Arc<Pattern> {
        self.store.load()
    }

    /// Flip a cell. Switching on a cell of the step currently playing sounds
    /// it right away instead of waiting for the next bar.
    pub fn toggle(&self, row: Row, step: usize) -> bool {
        // the step playing at click time, before the edit is published
        let state = self.playback.state();
        let pattern = self.store.toggle(row, step);
        let active = pattern.is_active(row, step);

        if active && state.is_playing && state.current_step == step {
            self.bus.trigger(row.trigger());
        }
        active
    }

    pub fn clear(&self) {
        self.store.clear();
        info!("Pattern cleared");
    }

    /// Load the next demo; playback keeps running
    pub fn next_demo(&mut self) -> &'static str {
        let demo = self.demos.next();
        self.store.replace_all(demo.pattern());
        info!(demo = demo.name, "Demo loaded");
        demo.name
    }

    pub fn demo_name(&self) -> &'static str {
        self.demos.current().name
    }

    pub fn start(&mut self) {
        self.playback.start();
    }

    pub fn stop(&mut self) {
        self.playback.stop();
    }

    /// Returns whether the transport is now playing
    pub fn toggle_play(&mut self) -> bool {
        if self.playback.is_running() {
            self.stop();
        } else {
            self.start();
        }
        self.playback.is_running()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_running()
    }

    pub fn tempo(&self) -> f32 {
        self.playback.state().tempo
    }

    pub fn set_tempo(&mut self, bpm: f32) -> f32 {
        self.playback.set_tempo(bpm)
    }

    /// Shift the tempo by `delta` BPM, staying within range
    pub fn nudge_tempo(&mut self, delta: f32) -> f32 {
        let tempo = self.tempo() + delta;
        self.set_tempo(tempo)
    }

    pub fn state(&self) -> TransportState {
        self.playback.state()
    }

    /// Audition an instrument family
    pub fn preview(&self, instrument: Instrument) {
        debug!(?instrument, "preview");
        self.bus.trigger(instrument.preview());
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.playback.poll_events()
    }
}
