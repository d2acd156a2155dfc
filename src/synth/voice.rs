//! A single sounding note

use crate::audio::NodeId;

use super::Waveform;

/// Lifecycle of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Attack or decay still in progress
    Attacking,
    Sustaining,
    /// Note released; the oscillator halts at the release deadline
    Releasing,
    /// Removed from the registry and its nodes released
    Stopped,
}

/// An oscillator and its envelope gain, sounding one note
#[derive(Debug, Clone)]
pub struct Voice {
    note: String,
    frequency: f64,
    waveform: Waveform,
    start_time: f64,
    state: VoiceState,
    oscillator: NodeId,
    gain: NodeId,
    release_deadline: Option<f64>,
}

impl Voice {
    /// Create a voice whose attack began at `start_time`
    pub fn new(
        note: impl Into<String>,
        frequency: f64,
        waveform: Waveform,
        start_time: f64,
        oscillator: NodeId,
        gain: NodeId,
    ) -> Self {
        Self {
            note: note.into(),
            frequency,
            waveform,
            start_time,
            state: VoiceState::Attacking,
            oscillator,
            gain,
            release_deadline: None,
        }
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn oscillator(&self) -> NodeId {
        self.oscillator
    }

    pub fn gain(&self) -> NodeId {
        self.gain
    }

    /// When the release completes, if the voice is releasing
    pub fn release_deadline(&self) -> Option<f64> {
        self.release_deadline
    }

    pub fn is_releasing(&self) -> bool {
        self.state == VoiceState::Releasing
    }

    pub(crate) fn sustain(&mut self) {
        if self.state == VoiceState::Attacking {
            self.state = VoiceState::Sustaining;
        }
    }

    pub(crate) fn begin_release(&mut self, deadline: f64) {
        self.state = VoiceState::Releasing;
        self.release_deadline = Some(deadline);
    }

    pub(crate) fn stop(&mut self) {
        self.state = VoiceState::Stopped;
    }
}
