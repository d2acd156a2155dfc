//! Myco - a polyphonic keyboard synth
//!
//! Each held note gets its own oscillator and envelope on an audio device;
//! voices are started, released and cleaned up by the [`SynthEngine`].

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod keymap;
pub mod synth;

pub use config::SynthConfig;
pub use engine::{SynthEngine, VoiceObserver};
pub use error::{DeviceError, SynthError};
