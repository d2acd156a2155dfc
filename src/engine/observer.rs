//! Outbound notifications from the voice engine

/// Receives voice lifecycle notifications, typically a UI layer.
///
/// All methods default to doing nothing.
pub trait VoiceObserver {
    /// A new voice for `note` began its attack
    fn on_voice_started(&mut self, _note: &str) {}

    /// The voice for `note` left the registry
    fn on_voice_stopped(&mut self, _note: &str) {}

    /// A session-level failure the user should see
    fn on_error(&mut self, _message: &str) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl VoiceObserver for NullObserver {}

/// A recorded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Started(String),
    Stopped(String),
    Error(String),
}

/// Observer that keeps every notification in order
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<VoiceEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[VoiceEvent] {
        &self.events
    }

    /// Number of voices started
    pub fn started(&self) -> usize {
        self.count(|e| matches!(e, VoiceEvent::Started(_)))
    }

    /// Number of stop notifications for `note`
    pub fn stops_of(&self, note: &str) -> usize {
        self.count(|e| matches!(e, VoiceEvent::Stopped(n) if n == note))
    }

    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                VoiceEvent::Error(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn count(&self, pred: impl Fn(&VoiceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(*e)).count()
    }
}

impl VoiceObserver for EventLog {
    fn on_voice_started(&mut self, note: &str) {
        self.events.push(VoiceEvent::Started(note.to_string()));
    }

    fn on_voice_stopped(&mut self, note: &str) {
        self.events.push(VoiceEvent::Stopped(note.to_string()));
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(VoiceEvent::Error(message.to_string()));
    }
}
