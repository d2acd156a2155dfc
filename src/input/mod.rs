//! Computer keyboard control in a raw-mode terminal
//!
//! Keys are translated into [`Command`]s and applied to a [`SynthEngine`] by
//! a [`Session`]. Terminals that report key releases get true note-off on
//! release. Elsewhere a held key keeps its note alive through key repeat and
//! the note is released once repeats stop arriving for `hold_ms`.

use std::collections::HashMap;
use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use log::{debug, warn};

use crate::audio::AudioDevice;
use crate::config::KeyboardConfig;
use crate::engine::{SynthEngine, VoiceObserver};
use crate::keymap::{self, NoteBinding};
use crate::synth::Waveform;

/// How often the session wakes up without input
const TICK: Duration = Duration::from_millis(10);

/// Master volume change per key press
const VOLUME_STEP: f64 = 0.1;

/// What a key press asks the synth to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    NoteDown(&'static NoteBinding),
    NoteUp(&'static NoteBinding),
    SetWaveform(Waveform),
    VolumeUp,
    VolumeDown,
    TestTone,
    Panic,
    Quit,
}

/// Map a terminal key event to a command
pub fn translate(key: &KeyEvent) -> Option<Command> {
    if key.kind == KeyEventKind::Release {
        return match key.code {
            KeyCode::Char(c) => keymap::note_for_key(c).map(Command::NoteUp),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(Command::Quit),
        KeyCode::Char(' ') => Some(Command::TestTone),
        KeyCode::Char('0') => Some(Command::Panic),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Command::VolumeUp),
        KeyCode::Char('-') | KeyCode::Char('_') => Some(Command::VolumeDown),
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            Some(Command::SetWaveform(Waveform::ALL[index]))
        }
        KeyCode::Char(c) => keymap::note_for_key(c).map(Command::NoteDown),
        _ => None,
    }
}

/// Keyboard state between key events
pub struct Session {
    hold: Duration,
    test_tone: Duration,
    reports_releases: bool,
    /// Held notes and, without release events, when they lapse
    held: HashMap<&'static str, Option<Instant>>,
    tone_until: Option<Instant>,
}

impl Session {
    pub fn new(config: &KeyboardConfig, reports_releases: bool) -> Self {
        Self {
            hold: Duration::from_millis(config.hold_ms),
            test_tone: Duration::from_millis(config.test_tone_ms),
            reports_releases,
            held: HashMap::new(),
            tone_until: None,
        }
    }

    /// Notes currently held down, sorted
    pub fn held_notes(&self) -> Vec<&'static str> {
        let mut notes: Vec<_> = self.held.keys().copied().collect();
        notes.sort_unstable();
        notes
    }

    pub fn test_tone_playing(&self) -> bool {
        self.tone_until.is_some()
    }

    /// Apply a command at `now`. Returns false when the session should end.
    pub fn apply<D: AudioDevice, O: VoiceObserver>(
        &mut self,
        engine: &mut SynthEngine<D, O>,
        command: Command,
        now: Instant,
    ) -> bool {
        match command {
            Command::NoteDown(binding) => {
                let deadline = (!self.reports_releases).then(|| now + self.hold);
                if let Some(lapse) = self.held.get_mut(binding.note) {
                    // Key repeat
                    *lapse = deadline;
                    return true;
                }
                self.held.insert(binding.note, deadline);
                if let Err(err) = engine.note_on(binding.note, binding.frequency) {
                    warn!("{}", err);
                }
            }
            Command::NoteUp(binding) => {
                if self.held.remove(binding.note).is_some() && !self.tone_holds(binding.note) {
                    engine.note_off(binding.note);
                }
            }
            Command::SetWaveform(waveform) => engine.set_waveform(waveform),
            Command::VolumeUp => engine.set_master_volume(engine.master_volume() + VOLUME_STEP),
            Command::VolumeDown => engine.set_master_volume(engine.master_volume() - VOLUME_STEP),
            Command::TestTone => {
                if let Some(tone) = keymap::binding(keymap::TEST_TONE) {
                    self.tone_until = Some(now + self.test_tone);
                    if let Err(err) = engine.note_on(tone.note, tone.frequency) {
                        warn!("{}", err);
                    }
                }
            }
            Command::Panic => {
                self.held.clear();
                self.tone_until = None;
                engine.panic();
            }
            Command::Quit => return false,
        }

        true
    }

    /// Release lapsed keys and the finished test tone, then let the engine
    /// catch up with its clock.
    pub fn tick<D: AudioDevice, O: VoiceObserver>(
        &mut self,
        engine: &mut SynthEngine<D, O>,
        now: Instant,
    ) {
        let lapsed: Vec<&'static str> = self
            .held
            .iter()
            .filter(|(_, deadline)| deadline.map_or(false, |d| now >= d))
            .map(|(note, _)| *note)
            .collect();
        for note in lapsed {
            self.held.remove(note);
            if !self.tone_holds(note) {
                engine.note_off(note);
            }
        }

        if self.tone_until.map_or(false, |until| now >= until) {
            self.tone_until = None;
            if !self.held.contains_key(keymap::TEST_TONE) {
                engine.note_off(keymap::TEST_TONE);
            }
        }

        engine.poll();
    }

    fn tone_holds(&self, note: &str) -> bool {
        self.tone_until.is_some() && note == keymap::TEST_TONE
    }
}

/// Prints voice notifications in a raw-mode terminal
#[derive(Debug, Default)]
pub struct TerminalObserver;

impl TerminalObserver {
    fn line(text: &str) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}\r\n", text);
        let _ = stdout.flush();
    }
}

impl VoiceObserver for TerminalObserver {
    fn on_voice_started(&mut self, note: &str) {
        Self::line(&format!("  on  {}", note));
    }

    fn on_voice_stopped(&mut self, note: &str) {
        Self::line(&format!("  off {}", note));
    }

    fn on_error(&mut self, message: &str) {
        Self::line(&format!("Audio error: {}", message));
    }
}

/// Raw mode for the lifetime of the value
struct RawTerminal {
    enhanced: bool,
}

impl RawTerminal {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let mut terminal = Self { enhanced: false };

        if supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                std::io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
            terminal.enhanced = true;
        }

        Ok(terminal)
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

/// Play `engine` from the keyboard until the user quits
pub fn run<D: AudioDevice, O: VoiceObserver>(
    engine: &mut SynthEngine<D, O>,
    config: &KeyboardConfig,
) -> Result<()> {
    let terminal = RawTerminal::enter()?;
    let mut session = Session::new(config, terminal.enhanced);
    debug!(
        "Keyboard session started ({})",
        if terminal.enhanced { "key release events" } else { "auto-release" }
    );

    loop {
        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if let Some(command) = translate(&key) {
                    if !session.apply(engine, command, Instant::now()) {
                        break;
                    }
                }
            }
        }
        session.tick(engine, Instant::now());
    }

    engine.panic();
    drop(terminal);
    Ok(())
}
