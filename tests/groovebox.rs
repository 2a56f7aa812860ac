use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use groovebox::{
    Drum, Instrument, Note, OutputBus, PlaybackEvent, Row, Sequencer, SequencerConfig, Trigger,
    STEPS,
};

const SAMPLE_RATE: f32 = 44100.0;

fn render_seconds(bus: &OutputBus, seconds: f32) -> Vec<f32> {
    let mut buffer = vec![0.0f32; (seconds * SAMPLE_RATE) as usize * 2];
    bus.render(&mut buffer, 2);
    buffer
}

#[test]
fn test_demo_playback_produces_sound() {
    let bus = OutputBus::offline(SAMPLE_RATE);
    let mut sequencer = Sequencer::new(bus.clone(), &SequencerConfig::default());

    sequencer.start();
    let output = render_seconds(&bus, 0.25);
    sequencer.stop();

    let peak = output.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(peak > 0.05, "peak {peak}");
    assert!(output.iter().all(|s| (-1.0..=1.0).contains(s)));

    let spectrum = bus.spectrum();
    assert!(spectrum.bass > 0.0);
}

#[test]
fn test_voices_ring_out_after_stop() {
    let bus = OutputBus::offline(SAMPLE_RATE);
    let mut sequencer = Sequencer::new(bus.clone(), &SequencerConfig::default());
    sequencer.clear();
    sequencer.toggle(Row::Strings(Note::A3), 0);

    sequencer.start();
    sequencer.stop();
    assert_eq!(bus.active_triggers(), vec![Trigger::Strings(Note::A3)]);

    // stopping never cuts a voice short
    render_seconds(&bus, 1.0);
    assert_eq!(bus.active_voices(), 1);

    render_seconds(&bus, 2.0);
    assert_eq!(bus.active_voices(), 0);
}

#[test]
fn test_live_edits_while_rendering() {
    let bus = OutputBus::offline(SAMPLE_RATE);
    let mut sequencer = Sequencer::new(
        bus.clone(),
        &SequencerConfig {
            tempo: 200.0,
            ..Default::default()
        },
    );

    // stand-in for the device callback
    let running = Arc::new(AtomicBool::new(true));
    let renderer = {
        let bus = bus.clone();
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut block = vec![0.0f32; 512 * 2];
            while running.load(Ordering::Relaxed) {
                bus.render(&mut block, 2);
                thread::sleep(Duration::from_millis(2));
            }
        })
    };

    sequencer.start();
    for step in 0..STEPS {
        sequencer.toggle(Row::Drum(Drum::HiHat), step);
        sequencer.toggle(Row::Synth(Note::G4), step);
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(200));
    sequencer.stop();

    running.store(false, Ordering::Relaxed);
    renderer.join().expect("renderer thread panicked");

    let steps: Vec<usize> = sequencer
        .poll_events()
        .into_iter()
        .filter_map(|event| match event {
            PlaybackEvent::StepAdvanced(step) => Some(step),
            PlaybackEvent::Stopped => None,
        })
        .collect();
    assert!(steps.len() > 2);
    for pair in steps.windows(2) {
        assert_eq!(pair[1], (pair[0] + 1) % STEPS);
    }
}

#[test]
fn test_instrument_previews() {
    let bus = OutputBus::offline(SAMPLE_RATE);
    let sequencer = Sequencer::new(bus.clone(), &SequencerConfig::default());
    for instrument in Instrument::ALL {
        sequencer.preview(instrument);
    }
    assert_eq!(
        bus.active_triggers(),
        vec![
            Trigger::Kick,
            Trigger::Bass(Note::D4),
            Trigger::Synth(Note::E4),
            Trigger::Strings(Note::G4),
            Trigger::Drop { seconds: 0.5 },
        ]
    );
}
