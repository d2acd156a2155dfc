//! Real-time audio playback using cpal

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::SharedDevice;

/// An output device and the stream format it will be driven with
pub struct OutputTarget {
    device: Device,
    config: SupportedStreamConfig,
}

impl OutputTarget {
    pub fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Rate the shared render device must run at
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }
}

/// Find the named output device (substring match), or the default one
pub fn open_output(name: Option<&str>) -> Result<OutputTarget> {
    let host = cpal::default_host();

    let device = match name {
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
            .ok_or_else(|| anyhow!("Output device '{}' not found", name))?,
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?,
    };

    let config = device.default_output_config()?;
    Ok(OutputTarget { device, config })
}

/// Real-time audio player
pub struct Player {
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl Player {
    /// Create a new player
    pub fn new() -> Self {
        Self {
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start streaming `device` to `target`.
    ///
    /// The render device must have been created at `target.sample_rate()`.
    pub fn start(&mut self, target: OutputTarget, device: SharedDevice) -> Result<()> {
        let rendering_at = device.lock().sample_rate();
        if rendering_at != target.sample_rate() {
            return Err(anyhow!(
                "render device runs at {} Hz but output expects {} Hz",
                rendering_at,
                target.sample_rate()
            ));
        }

        let sample_format = target.config.sample_format();
        let stream_config: StreamConfig = target.config.clone().into();

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&target.device, &stream_config, device, running)?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&target.device, &stream_config, device, running)?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&target.device, &stream_config, device, running)?
            }
            other => return Err(anyhow!("Unsupported sample format {:?}", other)),
        };

        stream.play()?;
        info!(
            "Playing through {} ({} Hz, {} ch)",
            target.name(),
            stream_config.sample_rate.0,
            stream_config.channels
        );
        self.stream = Some(stream);

        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    source: SharedDevice,
    running: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::new();
    let on_error = source.clone();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);

            if running.load(Ordering::SeqCst) {
                // Contended lock renders silence for this buffer
                source.try_render(&mut mono);
            } else {
                mono.fill(0.0);
            }

            for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                for channel_sample in frame.iter_mut() {
                    *channel_sample = T::from_sample(sample);
                }
            }
        },
        move |err| {
            error!("Audio stream error: {}", err);
            if let cpal::StreamError::DeviceNotAvailable = err {
                on_error.fail(err.to_string());
            }
        },
        None,
    )?;

    Ok(stream)
}

/// List all available output devices with their default config
pub fn list_output_devices() -> Vec<(String, StreamConfig)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_output_config()) {
                devices.push((name, config.into()));
            }
        }
    }

    devices
}
