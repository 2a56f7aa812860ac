/// Playback engine - the transport clock stepping through the pattern
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, trace};

use super::pattern::{PatternStore, STEPS};
use crate::audio::OutputBus;
use crate::config::{MAX_TEMPO, MIN_TEMPO};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    Stopped,
}

/// Snapshot of the transport, written only by the playback engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    pub current_step: usize,
    /// BPM
    pub tempo: f32,
}

pub fn clamp_tempo(bpm: f32) -> f32 {
    bpm.clamp(MIN_TEMPO, MAX_TEMPO)
}

/// Time between sixteenth-note steps
pub fn step_interval(bpm: f32) -> Duration {
    Duration::from_secs_f64(60.0 / (clamp_tempo(bpm) as f64 * 4.0))
}

enum ClockControl {
    Retune(Duration),
    Stop,
}

/// State shared by the engine handle and its clock thread
struct Transport {
    state: Mutex<TransportState>,
    store: Arc<PatternStore>,
    bus: OutputBus,
    events: Sender<PlaybackEvent>,
}

impl Transport {
    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Trigger every active cell of `step` from a fresh snapshot
    fn fire(&self, step: usize) {
        let pattern = self.store.load();
        for row in pattern.active_rows(step) {
            self.bus.trigger(row.trigger());
        }
        let _ = self.events.try_send(PlaybackEvent::StepAdvanced(step));
    }

    fn advance(&self) {
        let step = {
            let mut state = self.lock();
            if !state.is_playing {
                return;
            }
            state.current_step = (state.current_step + 1) % STEPS;
            state.current_step
        };
        trace!(step, "tick");
        self.fire(step);
    }
}

struct Clock {
    control: Sender<ClockControl>,
    handle: JoinHandle<()>,
}

/// Absolute-deadline timer: each tick is scheduled one period after the
/// previous deadline, not after the previous wakeup.
fn run_clock(transport: Arc<Transport>, control: Receiver<ClockControl>, mut period: Duration) {
    let mut deadline = Instant::now() + period;

    loop {
        match control.recv_deadline(deadline) {
            Ok(ClockControl::Retune(next)) => {
                period = next;
                deadline = Instant::now() + period;
            }
            Ok(ClockControl::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                transport.advance();

                deadline += period;
                let now = Instant::now();
                if deadline <= now {
                    debug!(behind = ?(now - deadline), "clock fell behind, re-anchoring");
                    deadline = now + period;
                }
            }
        }
    }
}

pub struct PlaybackEngine {
    transport: Arc<Transport>,
    clock: Option<Clock>,
    events: Receiver<PlaybackEvent>,
}

impl PlaybackEngine {
    pub fn new(store: Arc<PatternStore>, bus: OutputBus, tempo: f32) -> Self {
        let (sender, receiver) = bounded(EVENT_CAPACITY);

        Self {
            transport: Arc::new(Transport {
                state: Mutex::new(TransportState {
                    is_playing: false,
                    current_step: 0,
                    tempo: clamp_tempo(tempo),
                }),
                store,
                bus,
                events: sender,
            }),
            clock: None,
            events: receiver,
        }
    }

    /// Begin at step 0: its cells sound immediately, then the clock takes over
    pub fn start(&mut self) {
        let tempo = {
            let mut state = self.transport.lock();
            if state.is_playing {
                return;
            }
            state.is_playing = true;
            state.current_step = 0;
            state.tempo
        };

        self.transport.fire(0);

        let (control, receiver) = unbounded();
        let transport = Arc::clone(&self.transport);
        let period = step_interval(tempo);
        let handle = thread::spawn(move || run_clock(transport, receiver, period));
        self.clock = Some(Clock { control, handle });

        info!(tempo, "Playback started");
    }

    /// Halt the clock and rewind to step 0. Voices already sounding ring out.
    pub fn stop(&mut self) {
        let was_playing = {
            let mut state = self.transport.lock();
            let was_playing = state.is_playing;
            state.is_playing = false;
            state.current_step = 0;
            was_playing
        };

        self.halt_clock();

        if was_playing {
            let _ = self.transport.events.try_send(PlaybackEvent::Stopped);
            info!("Playback stopped");
        }
    }

    fn halt_clock(&mut self) {
        if let Some(clock) = self.clock.take() {
            let _ = clock.control.send(ClockControl::Stop);
            let _ = clock.handle.join();
        }
    }

    /// Store the clamped tempo; a running clock is re-armed from now
    /// without touching the current step.
    pub fn set_tempo(&mut self, bpm: f32) -> f32 {
        let tempo = clamp_tempo(bpm);
        self.transport.lock().tempo = tempo;

        if let Some(clock) = &self.clock {
            let _ = clock.control.send(ClockControl::Retune(step_interval(tempo)));
        }
        debug!(tempo, "tempo changed");
        tempo
    }

    pub fn is_running(&self) -> bool {
        self.transport.lock().is_playing
    }

    pub fn state(&self) -> TransportState {
        *self.transport.lock()
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.transport.lock().is_playing = false;
        self.halt_clock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Trigger;
    use crate::sequencer::pattern::{Drum, Pattern, Row};

    fn engine(pattern: Pattern, tempo: f32) -> (PlaybackEngine, OutputBus) {
        let bus = OutputBus::offline(44100.0);
        let store = Arc::new(PatternStore::new(pattern));
        (PlaybackEngine::new(store, bus.clone(), tempo), bus)
    }

    fn steps(events: &[PlaybackEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::StepAdvanced(step) => Some(*step),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_step_interval_formula() {
        for bpm in 60..=200 {
            let expected = 60_000.0 / (bpm as f64 * 4.0);
            let got = step_interval(bpm as f32).as_secs_f64() * 1000.0;
            assert!((got - expected).abs() < 1e-6, "{bpm}: {got}");
        }
        assert_eq!(step_interval(120.0), Duration::from_millis(125));
        assert_eq!(step_interval(500.0), step_interval(200.0));
    }

    #[test]
    fn test_start_fires_step_zero_immediately() {
        let pattern = Pattern::empty().with(Row::Drum(Drum::Kick), &[0]);
        let (mut playback, bus) = engine(pattern, 60.0);

        playback.start();
        assert_eq!(bus.active_triggers(), vec![Trigger::Kick]);
        assert_eq!(steps(&playback.poll_events()), vec![0]);
        playback.stop();
    }

    #[test]
    fn test_steps_advance_without_skips() {
        let (mut playback, _bus) = engine(Pattern::empty(), 200.0);
        playback.start();
        thread::sleep(Duration::from_millis(420));
        playback.stop();

        let seen = steps(&playback.poll_events());
        assert!(seen.len() >= 4, "only {seen:?}");
        for (i, step) in seen.iter().enumerate() {
            assert_eq!(*step, i % STEPS);
        }
    }

    #[test]
    fn test_advance_wraps_after_last_step() {
        let bus = OutputBus::offline(44100.0);
        let pattern = Pattern::empty().with(Row::Drum(Drum::Kick), &[0]);
        let (sender, receiver) = bounded(EVENT_CAPACITY);
        let transport = Transport {
            state: Mutex::new(TransportState {
                is_playing: true,
                current_step: 0,
                tempo: 120.0,
            }),
            store: Arc::new(PatternStore::new(pattern)),
            bus: bus.clone(),
            events: sender,
        };

        transport.fire(0);
        for _ in 0..2 * STEPS {
            transport.advance();
        }

        let seen = steps(&receiver.try_iter().collect::<Vec<_>>());
        let expected: Vec<usize> = (0..STEPS).chain(0..STEPS).chain([0]).collect();
        assert_eq!(seen, expected);
        assert_eq!(bus.active_triggers(), vec![Trigger::Kick; 3]);
    }

    #[test]
    fn test_retune_changes_running_rate() {
        let (mut playback, _bus) = engine(Pattern::empty(), 200.0);
        playback.start();
        thread::sleep(Duration::from_millis(200));

        playback.set_tempo(60.0);
        playback.poll_events();
        thread::sleep(Duration::from_millis(450));
        let slow = steps(&playback.poll_events()).len();
        assert!((1..=2).contains(&slow), "{slow} steps at 60 BPM");

        playback.set_tempo(200.0);
        playback.poll_events();
        thread::sleep(Duration::from_millis(450));
        let fast = steps(&playback.poll_events()).len();
        assert!(fast >= 4, "{fast} steps at 200 BPM");

        playback.stop();
    }

    #[test]
    fn test_tempo_change_keeps_position() {
        let (mut playback, _bus) = engine(Pattern::empty(), 200.0);
        playback.start();
        thread::sleep(Duration::from_millis(200));

        let before = playback.state().current_step;
        assert!(before >= 1);
        assert_eq!(playback.set_tempo(60.0), 60.0);

        let after = playback.state();
        assert!(after.is_playing);
        assert_eq!(after.tempo, 60.0);
        assert!(after.current_step >= before);
        playback.stop();
    }

    #[test]
    fn test_stop_rewinds_and_silences_clock() {
        let (mut playback, _bus) = engine(Pattern::empty(), 200.0);
        playback.start();
        thread::sleep(Duration::from_millis(100));
        playback.stop();

        let state = playback.state();
        assert!(!state.is_playing);
        assert_eq!(state.current_step, 0);
        assert_eq!(playback.poll_events().last(), Some(&PlaybackEvent::Stopped));

        thread::sleep(Duration::from_millis(100));
        assert!(playback.poll_events().is_empty());
    }

    #[test]
    fn test_tempo_while_stopped_is_stored_and_clamped() {
        let (mut playback, _bus) = engine(Pattern::empty(), 120.0);
        assert_eq!(playback.set_tempo(300.0), 200.0);
        assert_eq!(playback.set_tempo(10.0), 60.0);
        assert!(!playback.is_running());
        assert_eq!(playback.state().tempo, 60.0);
    }
}
