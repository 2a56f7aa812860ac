/// Real-time synthesis engine using cpal
///
/// `AudioEngine` owns the device stream; everything else talks to the
/// cloneable `OutputBus` it hands out.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, warn};

use crate::config::AnalyserConfig;
use crate::error::{Error, Result};

pub mod analyser;
pub mod bus;
pub mod graph;
pub mod node;
pub mod param;
pub mod voice;

pub use analyser::Spectrum;
pub use bus::OutputBus;
pub use voice::{DropLength, Note, Trigger, Voice};

/// Lifecycle of the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No stream opened yet, or the last attempt failed
    Uninitialized,
    Active,
    /// Stream paused; engine time stands still
    Suspended,
}

/// Owns the device stream. Lives on the thread that created it, since
/// cpal streams are not `Send`.
pub struct AudioEngine {
    bus: OutputBus,
    stream: Option<cpal::Stream>,
}

impl AudioEngine {
    pub fn new(config: &AnalyserConfig) -> Self {
        Self {
            bus: OutputBus::new(config),
            stream: None,
        }
    }

    /// Handle to the bus without touching the device. Triggers sent through
    /// it are dropped until the stream has been opened.
    pub fn bus(&self) -> &OutputBus {
        &self.bus
    }

    pub fn state(&self) -> EngineState {
        self.bus.state()
    }

    /// Get the output bus, opening the device on first use and retargeting
    /// the master volume. A device failure is logged and retried on the next
    /// call; the returned bus then stays silent.
    pub fn output_bus(&mut self, volume: f32) -> &OutputBus {
        if self.stream.is_none() {
            match open_stream(&self.bus) {
                Ok((stream, sample_rate)) => {
                    self.bus.activate(sample_rate);
                    self.stream = Some(stream);
                }
                Err(err) => warn!("Audio output unavailable: {}", err),
            }
        }

        self.bus.set_volume(volume);

        if self.bus.state() == EngineState::Suspended {
            if let Err(err) = self.resume() {
                warn!("Failed to resume audio: {}", err);
            }
        }

        &self.bus
    }

    /// Pause the device stream. Scheduled voices wait until resumed.
    pub fn suspend(&mut self) -> Result<()> {
        if let (Some(stream), EngineState::Active) = (&self.stream, self.bus.state()) {
            stream.pause()?;
            self.bus.set_state(EngineState::Suspended);
            info!("Audio suspended");
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if let Some(stream) = &self.stream {
            stream.play()?;
            self.bus.set_state(EngineState::Active);
            info!("Audio resumed");
        }
        Ok(())
    }
}

fn open_stream(bus: &OutputBus) -> Result<(cpal::Stream, f32)> {
    let host = cpal::default_host();
    info!("Audio host: {:?}", host.id());

    let device = host.default_output_device().ok_or(Error::NoOutputDevice)?;
    if let Ok(name) = device.name() {
        info!("Audio device: {}", name);
    }

    let supported = device.default_output_config()?;
    info!("Audio config: {:?}", supported);

    let sample_rate = supported.sample_rate().0 as f32;
    let channels = supported.channels() as usize;
    let config = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, bus.clone(), channels),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, bus.clone(), channels),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, bus.clone(), channels),
        format => return Err(Error::UnsupportedSampleFormat(format)),
    }?;

    stream.play()?;
    info!("Audio stream started at {} Hz", sample_rate);

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bus: OutputBus,
    channels: usize,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            bus.render(data, channels);
        },
        |err| error!("Audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_engine_is_uninitialized() {
        let engine = AudioEngine::new(&AnalyserConfig::default());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.bus().spectrum(), Spectrum::default());
    }

    #[test]
    fn test_suspend_without_stream_is_noop() {
        let mut engine = AudioEngine::new(&AnalyserConfig::default());
        assert!(engine.suspend().is_ok());
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }
}
