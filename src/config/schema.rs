//! Configuration schema definitions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::engine::EngineSettings;
use crate::synth::{EnvelopeShape, Waveform};

/// Main configuration for Myco
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Audio output settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Master settings (volume, waveform)
    #[serde(default)]
    pub master: MasterConfig,

    /// Voice envelope
    #[serde(default)]
    pub envelope: EnvelopeConfig,

    /// Computer keyboard behaviour
    #[serde(default)]
    pub keyboard: KeyboardConfig,
}

impl SynthConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 192000 {
            bail!("Sample rate must be between 8000 and 192000");
        }
        if self.audio.buffer_size < 64 || self.audio.buffer_size > 8192 {
            bail!("Buffer size must be between 64 and 8192");
        }

        // Validate master settings
        if !(0.0..=1.0).contains(&self.master.volume) {
            bail!("Master volume must be between 0.0 and 1.0");
        }

        // Validate envelope
        let env = &self.envelope;
        for (name, ms) in [
            ("attack_ms", env.attack_ms),
            ("decay_ms", env.decay_ms),
            ("release_ms", env.release_ms),
        ] {
            if !(ms.is_finite() && ms > 0.0) {
                bail!("Envelope {} must be greater than 0", name);
            }
        }
        if !(env.peak > 0.0 && env.peak <= 1.0) {
            bail!("Envelope peak must be in (0.0, 1.0]");
        }
        if !(env.sustain > 0.0 && env.sustain <= env.peak) {
            bail!("Envelope sustain must be greater than 0 and at most the peak");
        }
        if !(env.release_floor > 0.0 && env.release_floor < env.sustain) {
            bail!("Envelope release_floor must be greater than 0 and below the sustain level");
        }

        // Validate keyboard
        if self.keyboard.hold_ms == 0 {
            bail!("Keyboard hold_ms must be greater than 0");
        }
        if self.keyboard.test_tone_ms == 0 {
            bail!("Keyboard test_tone_ms must be greater than 0");
        }

        Ok(())
    }

    /// Settings for a new [`SynthEngine`](crate::engine::SynthEngine)
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            envelope: self.envelope.shape(),
            volume: self.master.volume,
            waveform: self.master.waveform,
        }
    }
}

/// Audio output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz for offline rendering (default: 44100).
    /// Real-time playback uses the output device's rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Render block size in samples (default: 512)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Output device name (None = default device)
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_size: default_buffer_size(),
            device: None,
        }
    }
}

fn default_sample_rate() -> u32 { 44100 }
fn default_buffer_size() -> usize { 512 }

/// Master settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Master volume 0.0-1.0 (default: 0.5)
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// Initial waveform (default: sine)
    #[serde(default)]
    pub waveform: Waveform,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            waveform: Waveform::default(),
        }
    }
}

fn default_volume() -> f64 { 0.5 }

/// Envelope applied to every voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    /// Attack time in milliseconds (default: 10)
    #[serde(default = "default_attack_ms")]
    pub attack_ms: f64,

    /// Decay time in milliseconds (default: 90)
    #[serde(default = "default_decay_ms")]
    pub decay_ms: f64,

    /// Level reached at the end of the attack (default: 0.3)
    #[serde(default = "default_peak")]
    pub peak: f64,

    /// Level held while the key is down (default: 0.2)
    #[serde(default = "default_sustain")]
    pub sustain: f64,

    /// Release time in milliseconds (default: 100)
    #[serde(default = "default_release_ms")]
    pub release_ms: f64,

    /// Level the release ramp ends at; must be above zero (default: 0.01)
    #[serde(default = "default_release_floor")]
    pub release_floor: f64,
}

impl EnvelopeConfig {
    pub fn shape(&self) -> EnvelopeShape {
        EnvelopeShape {
            attack: self.attack_ms / 1000.0,
            decay: self.decay_ms / 1000.0,
            peak: self.peak,
            sustain: self.sustain,
            release: self.release_ms / 1000.0,
            release_floor: self.release_floor,
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack_ms: default_attack_ms(),
            decay_ms: default_decay_ms(),
            peak: default_peak(),
            sustain: default_sustain(),
            release_ms: default_release_ms(),
            release_floor: default_release_floor(),
        }
    }
}

fn default_attack_ms() -> f64 { 10.0 }
fn default_decay_ms() -> f64 { 90.0 }
fn default_peak() -> f64 { 0.3 }
fn default_sustain() -> f64 { 0.2 }
fn default_release_ms() -> f64 { 100.0 }
fn default_release_floor() -> f64 { 0.01 }

/// Computer keyboard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardConfig {
    /// How long a key counts as held when the terminal does not report key
    /// releases, refreshed by key repeat (default: 500)
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,

    /// Length of the test tone (default: 1000)
    #[serde(default = "default_test_tone_ms")]
    pub test_tone_ms: u64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            hold_ms: default_hold_ms(),
            test_tone_ms: default_test_tone_ms(),
        }
    }
}

fn default_hold_ms() -> u64 { 500 }
fn default_test_tone_ms() -> u64 { 1000 }
