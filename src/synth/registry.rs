//! Bookkeeping of active voices, at most one per note

use std::collections::HashMap;

use super::Voice;

/// Maps note identifiers to their active voice.
///
/// Pure bookkeeping: it never touches the audio device.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    voices: HashMap<String, Voice>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, note: &str) -> bool {
        self.voices.contains_key(note)
    }

    pub fn get(&self, note: &str) -> Option<&Voice> {
        self.voices.get(note)
    }

    pub fn get_mut(&mut self, note: &str) -> Option<&mut Voice> {
        self.voices.get_mut(note)
    }

    /// Register `voice` under `note`. Refuses, without overwriting, when the
    /// note already has a voice; returns whether the voice was inserted.
    pub fn insert(&mut self, note: &str, voice: Voice) -> bool {
        if self.has(note) {
            return false;
        }
        self.voices.insert(note.to_string(), voice);
        true
    }

    /// Remove the voice for `note`. Removing an absent note is a no-op.
    pub fn remove(&mut self, note: &str) -> Option<Voice> {
        self.voices.remove(note)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Registered notes, sorted
    pub fn notes(&self) -> Vec<String> {
        let mut notes: Vec<String> = self.voices.keys().cloned().collect();
        notes.sort();
        notes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Voice)> {
        self.voices.iter().map(|(note, voice)| (note.as_str(), voice))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Voice)> {
        self.voices.iter_mut().map(|(note, voice)| (note.as_str(), voice))
    }
}
