//! Note frequencies and computer-keyboard bindings
//!
//! One octave from C4, laid out on the home row with sharps on the row above:
//!
//! ```text
//!   W E   T Y U
//!  A S D F G H J
//! ```

/// A playable note and the key that plays it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteBinding {
    pub note: &'static str,
    /// Equal-tempered frequency in Hz (A4 = 440)
    pub frequency: f64,
    pub key: char,
}

const fn bind(note: &'static str, frequency: f64, key: char) -> NoteBinding {
    NoteBinding { note, frequency, key }
}

/// All bound notes, lowest first
pub const BINDINGS: [NoteBinding; 12] = [
    bind("C4", 261.63, 'a'),
    bind("C#4", 277.18, 'w'),
    bind("D4", 293.66, 's'),
    bind("D#4", 311.13, 'e'),
    bind("E4", 329.63, 'd'),
    bind("F4", 349.23, 'f'),
    bind("F#4", 369.99, 't'),
    bind("G4", 392.00, 'g'),
    bind("G#4", 415.30, 'y'),
    bind("A4", 440.00, 'h'),
    bind("A#4", 466.16, 'u'),
    bind("B4", 493.88, 'j'),
];

/// Note used by the test tone
pub const TEST_TONE: &str = "A4";

/// Look up a note by name (case-insensitive, e.g. `c#4`)
pub fn binding(note: &str) -> Option<&'static NoteBinding> {
    BINDINGS.iter().find(|b| b.note.eq_ignore_ascii_case(note))
}

/// Frequency of a named note
pub fn frequency(note: &str) -> Option<f64> {
    binding(note).map(|b| b.frequency)
}

/// The note bound to a key (case-insensitive)
pub fn note_for_key(key: char) -> Option<&'static NoteBinding> {
    let key = key.to_ascii_lowercase();
    BINDINGS.iter().find(|b| b.key == key)
}

/// Whether a note is a black key
pub fn is_sharp(note: &str) -> bool {
    note.contains('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pitches() {
        assert_eq!(frequency("A4"), Some(440.0));
        assert_eq!(frequency("C4"), Some(261.63));
        assert_eq!(frequency("c#4"), Some(277.18));
        assert_eq!(frequency("C5"), None);
    }

    #[test]
    fn test_frequencies_follow_equal_temperament() {
        for (idx, b) in BINDINGS.iter().enumerate() {
            let semitones = idx as f64 - 9.0;
            let expected = 440.0 * 2f64.powf(semitones / 12.0);
            assert!(
                (b.frequency - expected).abs() < 0.01,
                "{} is {} Hz, expected {:.2}",
                b.note,
                b.frequency,
                expected
            );
        }
    }

    #[test]
    fn test_keyboard_layout() {
        let white: String = BINDINGS.iter().filter(|b| !is_sharp(b.note)).map(|b| b.key).collect();
        let black: String = BINDINGS.iter().filter(|b| is_sharp(b.note)).map(|b| b.key).collect();
        assert_eq!(white, "asdfghj");
        assert_eq!(black, "wetyu");
    }

    #[test]
    fn test_note_for_key() {
        assert_eq!(note_for_key('a').map(|b| b.note), Some("C4"));
        assert_eq!(note_for_key('H').map(|b| b.note), Some("A4"));
        assert_eq!(note_for_key('w').map(|b| b.note), Some("C#4"));
        assert!(note_for_key('z').is_none());
    }

    #[test]
    fn test_test_tone_is_bound() {
        assert_eq!(binding(TEST_TONE).map(|b| b.key), Some('h'));
    }
}
