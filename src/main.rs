#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use clap::Parser;

#[cfg(feature = "gui")]
use groovebox::{
    AudioEngine, Config, Instrument, PlaybackEvent, Sequencer, SequencerConfig, STEPS,
};

#[cfg(feature = "gui")]
#[derive(Parser)]
#[command(name = "groovebox")]
#[command(author, version, about = "Procedural 16-step groove sequencer")]
struct Args {
    /// Tempo in BPM (60-200)
    #[arg(long, short = 't', default_value = "120")]
    tempo: f32,

    /// Master volume (0.0-1.0)
    #[arg(long, short = 'v', default_value = "0.7")]
    volume: f32,

    /// Demo pattern loaded at startup (0-3)
    #[arg(long, short = 'd', default_value = "3")]
    demo: usize,
}

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config {
        sequencer: SequencerConfig {
            tempo: args.tempo,
            volume: args.volume,
            demo_index: args.demo,
        },
        ..Default::default()
    };
    if let Err(err) = config.validate() {
        tracing::error!("{}", err);
        std::process::exit(2);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title("GrooveBox"),
        ..Default::default()
    };

    eframe::run_native(
        "GrooveBox",
        options,
        Box::new(move |_cc| Ok(Box::new(GrooveBoxApp::new(&config)))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct GrooveBoxApp {
    audio: AudioEngine,
    sequencer: Sequencer,

    // UI state
    instrument: Instrument,
    volume: f32,
    current_visual_step: usize,
}

#[cfg(feature = "gui")]
impl GrooveBoxApp {
    fn new(config: &Config) -> Self {
        let audio = AudioEngine::new(&config.analyser);
        let sequencer = Sequencer::new(audio.bus().clone(), &config.sequencer);

        Self {
            audio,
            sequencer,
            instrument: Instrument::Drums,
            volume: config.sequencer.volume,
            current_visual_step: 0,
        }
    }

    /// Audio may only start from a user gesture, so every control calls this
    fn ensure_audio(&mut self) {
        self.audio.output_bus(self.volume);
    }

    fn handle_playback_events(&mut self) {
        for event in self.sequencer.poll_events() {
            match event {
                PlaybackEvent::StepAdvanced(step) => self.current_visual_step = step,
                PlaybackEvent::Stopped => self.current_visual_step = 0,
            }
        }
    }

    fn instrument_selector(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for instrument in Instrument::ALL {
                if ui
                    .selectable_label(self.instrument == instrument, instrument.label())
                    .clicked()
                {
                    self.ensure_audio();
                    self.instrument = instrument;
                    self.sequencer.preview(instrument);
                }
            }
        });
    }

    fn step_grid(&mut self, ui: &mut egui::Ui) {
        let pattern = self.sequencer.pattern();
        let is_playing = self.sequencer.is_playing();
        let mut clicked = None;

        egui::Grid::new("steps").spacing([4.0, 4.0]).show(ui, |ui| {
            for row in self.instrument.rows() {
                ui.label(row.label());
                for step in 0..STEPS {
                    let is_current = is_playing && self.current_visual_step == step;
                    let enabled = pattern.is_active(row, step);

                    let button = egui::Button::new("")
                        .min_size(egui::vec2(36.0, 36.0))
                        .fill(if enabled && is_current {
                            egui::Color32::from_rgb(140, 220, 140)
                        } else if enabled {
                            egui::Color32::from_rgb(60, 60, 200)
                        } else if is_current {
                            egui::Color32::from_rgb(70, 90, 70)
                        } else {
                            egui::Color32::from_rgb(40, 40, 40)
                        });

                    if ui.add(button).clicked() {
                        clicked = Some((row, step));
                    }
                }
                ui.end_row();
            }
        });

        if let Some((row, step)) = clicked {
            self.ensure_audio();
            self.sequencer.toggle(row, step);
        }
    }

    fn transport(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let label = if self.sequencer.is_playing() {
                "⏸ Stop"
            } else {
                "▶ Play"
            };
            if ui.button(label).clicked() {
                self.ensure_audio();
                self.sequencer.toggle_play();
            }

            ui.add_space(20.0);

            if ui.button("−").clicked() {
                self.sequencer.nudge_tempo(-10.0);
            }
            ui.label(format!("{:.0} BPM", self.sequencer.tempo()));
            if ui.button("+").clicked() {
                self.sequencer.nudge_tempo(10.0);
            }

            ui.add_space(20.0);

            ui.label("Volume:");
            let mut volume = self.volume;
            if ui.add(egui::Slider::new(&mut volume, 0.0..=1.0)).changed() {
                self.volume = volume;
                self.ensure_audio();
            }

            ui.add_space(20.0);

            if ui.button("Demo").clicked() {
                self.sequencer.next_demo();
            }
            ui.label(self.sequencer.demo_name());

            if ui.button("Clear").clicked() {
                self.sequencer.clear();
            }
        });
    }

    fn meters(&self, ui: &mut egui::Ui) {
        let spectrum = self.audio.bus().spectrum();
        for (name, level) in [
            ("Bass", spectrum.bass),
            ("Mid", spectrum.mid),
            ("Treble", spectrum.treble),
        ] {
            ui.add(egui::ProgressBar::new(level).text(name));
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for GrooveBoxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("GrooveBox");
            ui.add_space(10.0);

            self.instrument_selector(ui);
            ui.add_space(10.0);

            self.step_grid(ui);
            ui.add_space(20.0);

            self.transport(ui);
            ui.add_space(20.0);

            self.meters(ui);

            ui.separator();
            ui.label("Click steps to enable/disable them");
        });
    }
}
