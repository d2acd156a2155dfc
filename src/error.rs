//! Error types for the audio device and the voice engine

use thiserror::Error;

use crate::audio::NodeId;

/// Failures raised by an [`AudioDevice`](crate::audio::AudioDevice)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// No audio capability at all (no output device, stream failed to open)
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("audio device is closed")]
    Closed,

    #[error("unknown audio node {0}")]
    UnknownNode(NodeId),

    #[error("audio node {node} is not {expected}")]
    WrongNodeKind { node: NodeId, expected: &'static str },

    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },

    #[error("invalid schedule time: {0}")]
    InvalidTime(f64),

    #[error("oscillator {0} was already started")]
    AlreadyStarted(NodeId),
}

impl DeviceError {
    /// Whether the failure means the device can no longer produce sound
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Unavailable(_) | DeviceError::Closed)
    }
}

/// Errors surfaced by the [`SynthEngine`](crate::engine::SynthEngine)
///
/// A duplicate note-on is not an error: it is a silent no-op.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthError {
    /// Fatal for the session; the engine stays inert afterwards.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A ramp or stop call failed for one note. Recovered by cleaning the voice up.
    #[error("failed to schedule note '{note}': {source}")]
    SchedulingFailure {
        note: String,
        #[source]
        source: DeviceError,
    },
}
