//! Voice building blocks
//!
//! Oscillators, the envelope scheduler, and the per-note voice bookkeeping
//! used by the [`SynthEngine`](crate::engine::SynthEngine).

mod envelope;
mod oscillator;
mod registry;
mod voice;

pub use envelope::{EnvelopeScheduler, EnvelopeShape, ReleasePlan};
pub use oscillator::{Oscillator, ParseWaveformError, Waveform};
pub use registry::VoiceRegistry;
pub use voice::{Voice, VoiceState};
