//! Note voice engine for Myco
//!
//! Turns note-on/note-off events into voices on an [`AudioDevice`]: one
//! oscillator and one envelope gain per note, all feeding a shared master gain.
//! Every operation runs to completion without waiting on the audio clock; it
//! only schedules changes. [`SynthEngine::poll`] applies the clock-driven
//! transitions (sustain reached, release finished) and must be called
//! regularly by the host loop.

mod observer;
mod player;
mod recorder;
mod script;

pub use observer::{EventLog, NullObserver, VoiceEvent, VoiceObserver};
pub use player::{list_output_devices, open_output, OutputTarget, Player};
pub use recorder::{Recorder, RecordingSummary};
pub use script::{NoteScript, ScriptStep};

use log::{debug, error, info, warn};

use crate::audio::{AudioDevice, DeviceState, NodeId};
use crate::config::SynthConfig;
use crate::error::{DeviceError, SynthError};
use crate::synth::{EnvelopeScheduler, EnvelopeShape, Voice, VoiceRegistry, VoiceState, Waveform};

/// Slack when comparing the clock with a deadline, far below one sample
const CLOCK_TOLERANCE: f64 = 1e-9;

/// Initial engine settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub envelope: EnvelopeShape,
    /// Master volume 0.0-1.0
    pub volume: f64,
    /// Waveform for voices started with [`SynthEngine::note_on`]
    pub waveform: Waveform,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            envelope: EnvelopeShape::default(),
            volume: 0.5,
            waveform: Waveform::Sine,
        }
    }
}

/// Monophonic-per-note voice manager
pub struct SynthEngine<D: AudioDevice, O: VoiceObserver> {
    device: D,
    observer: O,
    scheduler: EnvelopeScheduler,
    registry: VoiceRegistry,
    /// Releasing voices displaced by a retrigger, still sounding their tail
    tails: Vec<Voice>,
    master: Option<NodeId>,
    master_volume: f64,
    waveform: Waveform,
    /// Set once the device is found unusable; the engine is inert from then on
    unavailable: Option<String>,
}

impl<D: AudioDevice, O: VoiceObserver> SynthEngine<D, O> {
    /// Create an engine and its master output on `device`.
    ///
    /// If the device has no audio capability the engine is still created, but
    /// inert: the observer is told once and every note-on fails.
    pub fn new(device: D, observer: O, settings: EngineSettings) -> Self {
        let master_volume = if settings.volume.is_nan() {
            EngineSettings::default().volume
        } else {
            settings.volume.clamp(0.0, 1.0)
        };

        let mut engine = Self {
            device,
            observer,
            scheduler: EnvelopeScheduler::new(settings.envelope),
            registry: VoiceRegistry::new(),
            tails: Vec::new(),
            master: None,
            master_volume,
            waveform: settings.waveform,
            unavailable: None,
        };

        match engine.build_master() {
            Ok(master) => {
                engine.master = Some(master);
                info!(
                    "Synth initialized (volume {:.0}%, {} waveform)",
                    master_volume * 100.0,
                    engine.waveform
                );
            }
            Err(err) => {
                engine.go_inert(&err);
            }
        }

        engine
    }

    /// Create an engine from a loaded configuration
    pub fn from_config(device: D, observer: O, config: &SynthConfig) -> Self {
        Self::new(device, observer, config.engine_settings())
    }

    /// Start `note` with the current default waveform
    pub fn note_on(&mut self, note: &str, frequency: f64) -> Result<(), SynthError> {
        self.note_on_with(note, frequency, self.waveform)
    }

    /// Start `note` with an explicit waveform.
    ///
    /// A note that is already sounding is left alone. A note that is still
    /// releasing is retriggered: the old voice finishes its release on its own
    /// and a fresh voice takes its place. Scheduling failures are absorbed
    /// after rolling the voice back; only an unusable device is reported.
    pub fn note_on_with(
        &mut self,
        note: &str,
        frequency: f64,
        waveform: Waveform,
    ) -> Result<(), SynthError> {
        if let Some(reason) = &self.unavailable {
            return Err(SynthError::DeviceUnavailable(reason.clone()));
        }
        self.ensure_running()?;
        self.poll();

        let Some(master) = self.master else {
            return Err(self.go_inert(&DeviceError::Closed));
        };

        if let Some(voice) = self.registry.get(note) {
            if !voice.is_releasing() {
                debug!("Note {} already playing", note);
                return Ok(());
            }
            self.evict_for_retrigger(note);
        }

        match self.start_voice(note, frequency, waveform, master) {
            Ok(voice) => {
                self.registry.insert(note, voice);
                debug!("Playing note: {} at {}Hz ({})", note, frequency, waveform);
                self.observer.on_voice_started(note);
            }
            Err(source) if source.is_fatal() => return Err(self.go_inert(&source)),
            Err(source) => {
                let err = SynthError::SchedulingFailure {
                    note: note.to_string(),
                    source,
                };
                warn!("{}", err);
            }
        }

        Ok(())
    }

    /// Release `note`. The voice leaves the registry once the release ramp
    /// has finished; unknown or already releasing notes are ignored.
    pub fn note_off(&mut self, note: &str) {
        self.poll();

        let Some(voice) = self.registry.get(note) else {
            return;
        };
        if voice.is_releasing() {
            return;
        }

        let (oscillator, gain) = (voice.oscillator(), voice.gain());
        let now = self.device.current_time();

        match self.scheduler.schedule_release(&mut self.device, gain, oscillator, now) {
            Ok(plan) => {
                if let Some(voice) = self.registry.get_mut(note) {
                    voice.begin_release(plan.deadline);
                }
                debug!("Stopped note: {} (release from {:.3})", note, plan.start_level);
            }
            Err(source) => {
                let err = SynthError::SchedulingFailure {
                    note: note.to_string(),
                    source,
                };
                warn!("{}; forcing cleanup", err);
                self.force_stop(note);
            }
        }
    }

    /// Set the shared output level, clamped to 0.0-1.0, effective immediately.
    /// Voice envelopes are not touched.
    pub fn set_master_volume(&mut self, volume: f64) {
        if volume.is_nan() {
            warn!("Ignoring NaN master volume");
            return;
        }
        self.master_volume = volume.clamp(0.0, 1.0);

        let Some(master) = self.master else {
            return;
        };
        let now = self.device.current_time();
        if let Err(err) = self.device.set_value_at_time(master, self.master_volume, now) {
            warn!("Failed to set master volume: {}", err);
        }
    }

    /// Waveform for notes started from now on
    pub fn set_waveform(&mut self, waveform: Waveform) {
        if self.waveform != waveform {
            debug!("Waveform set to {}", waveform);
        }
        self.waveform = waveform;
    }

    /// Silence and drop every voice immediately, regardless of its envelope
    pub fn panic(&mut self) {
        let notes = self.registry.notes();
        let count = notes.len() + self.tails.len();
        if count > 0 {
            warn!("Silencing {} voices", count);
        }

        for note in notes {
            self.force_stop(&note);
        }
        for mut voice in std::mem::take(&mut self.tails) {
            self.silence(&mut voice);
        }
    }

    /// Apply every transition the audio clock has reached
    pub fn poll(&mut self) {
        let now = self.device.current_time();
        let onset = self.scheduler.shape().onset();

        let mut finished = Vec::new();
        for (note, voice) in self.registry.iter_mut() {
            match voice.state() {
                VoiceState::Attacking if reached(now, voice.start_time() + onset) => {
                    voice.sustain()
                }
                VoiceState::Releasing
                    if voice.release_deadline().is_some_and(|d| reached(now, d)) =>
                {
                    finished.push(note.to_string());
                }
                _ => {}
            }
        }

        for note in finished {
            if let Some(mut voice) = self.registry.remove(&note) {
                self.release_nodes(&mut voice);
                debug!("Voice {} finished", note);
                self.observer.on_voice_stopped(&note);
            }
        }

        if !self.tails.is_empty() {
            let (done, pending): (Vec<Voice>, Vec<Voice>) = std::mem::take(&mut self.tails)
                .into_iter()
                .partition(|voice| voice.release_deadline().map_or(true, |d| reached(now, d)));
            self.tails = pending;
            for mut voice in done {
                self.release_nodes(&mut voice);
            }
        }
    }

    pub fn has(&self, note: &str) -> bool {
        self.registry.has(note)
    }

    pub fn voice(&self, note: &str) -> Option<&Voice> {
        self.registry.get(note)
    }

    pub fn voice_state(&self, note: &str) -> Option<VoiceState> {
        self.registry.get(note).map(Voice::state)
    }

    /// Notes with a registered voice, sorted
    pub fn active_notes(&self) -> Vec<String> {
        self.registry.notes()
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    /// Retriggered voices still finishing their release
    pub fn release_tails(&self) -> usize {
        self.tails.len()
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }

    pub fn master_node(&self) -> Option<NodeId> {
        self.master
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn envelope(&self) -> &EnvelopeShape {
        self.scheduler.shape()
    }

    /// Whether the device was found unusable
    pub fn is_inert(&self) -> bool {
        self.unavailable.is_some()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    fn build_master(&mut self) -> Result<NodeId, DeviceError> {
        let master = self.device.create_gain()?;
        let now = self.device.current_time();
        let wired = self.wire_master(master, now);
        if wired.is_err() {
            self.device.disconnect(master);
        }
        wired.map(|()| master)
    }

    fn wire_master(&mut self, master: NodeId, now: f64) -> Result<(), DeviceError> {
        let destination = self.device.destination();
        self.device.connect(master, destination)?;
        self.device.set_value_at_time(master, self.master_volume, now)
    }

    fn ensure_running(&mut self) -> Result<(), SynthError> {
        if self.device.state() == DeviceState::Running {
            return Ok(());
        }
        match self.device.resume() {
            Ok(()) => {
                info!("Audio device resumed");
                Ok(())
            }
            Err(err) => Err(self.go_inert(&err)),
        }
    }

    /// Create, wire and schedule a voice. Nothing is left on the device if
    /// any step fails.
    fn start_voice(
        &mut self,
        note: &str,
        frequency: f64,
        waveform: Waveform,
        master: NodeId,
    ) -> Result<Voice, DeviceError> {
        let oscillator = self.device.create_oscillator(waveform, frequency)?;
        let gain = match self.device.create_gain() {
            Ok(gain) => gain,
            Err(err) => {
                self.device.disconnect(oscillator);
                return Err(err);
            }
        };

        let now = self.device.current_time();
        if let Err(err) = self.wire_voice(oscillator, gain, master, now) {
            self.device.disconnect(oscillator);
            self.device.disconnect(gain);
            return Err(err);
        }

        Ok(Voice::new(note, frequency, waveform, now, oscillator, gain))
    }

    fn wire_voice(
        &mut self,
        oscillator: NodeId,
        gain: NodeId,
        master: NodeId,
        now: f64,
    ) -> Result<(), DeviceError> {
        self.scheduler.schedule_attack(&mut self.device, gain, now)?;
        self.device.connect(oscillator, gain)?;
        self.device.connect(gain, master)?;
        self.device.start_oscillator(oscillator, now)
    }

    /// Move a releasing voice out of the registry so a new voice can take the
    /// note. Its nodes are released at its original deadline.
    fn evict_for_retrigger(&mut self, note: &str) {
        if let Some(voice) = self.registry.remove(note) {
            debug!("Retriggering {} during its release", note);
            self.observer.on_voice_stopped(note);
            self.tails.push(voice);
        }
    }

    fn force_stop(&mut self, note: &str) {
        if let Some(mut voice) = self.registry.remove(note) {
            self.silence(&mut voice);
            self.observer.on_voice_stopped(note);
        }
    }

    fn silence(&mut self, voice: &mut Voice) {
        let now = self.device.current_time();
        // Best effort: a failing device may be why we are here
        let _ = self.device.cancel_scheduled_values(voice.gain(), now);
        let _ = self.device.set_value_at_time(voice.gain(), 0.0, now);
        let _ = self.device.stop_oscillator(voice.oscillator(), now);
        self.release_nodes(voice);
    }

    fn release_nodes(&mut self, voice: &mut Voice) {
        self.device.disconnect(voice.oscillator());
        self.device.disconnect(voice.gain());
        voice.stop();
    }

    fn go_inert(&mut self, err: &DeviceError) -> SynthError {
        if let Some(reason) = &self.unavailable {
            return SynthError::DeviceUnavailable(reason.clone());
        }

        let reason = match err {
            DeviceError::Unavailable(reason) => reason.clone(),
            other => other.to_string(),
        };
        error!("Audio not available, synth disabled: {}", reason);
        self.observer.on_error(&format!("Audio not supported: {}", reason));
        self.unavailable = Some(reason.clone());
        self.panic();

        SynthError::DeviceUnavailable(reason)
    }
}

fn reached(now: f64, deadline: f64) -> bool {
    now + CLOCK_TOLERANCE >= deadline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AutomationEvent, RampKind, RenderDevice, SharedDevice};

    const RATE: u32 = 8000;

    fn engine() -> SynthEngine<RenderDevice, EventLog> {
        SynthEngine::new(RenderDevice::new(RATE), EventLog::new(), EngineSettings::default())
    }

    fn advance<O: VoiceObserver>(engine: &mut SynthEngine<RenderDevice, O>, seconds: f64) {
        engine.device_mut().advance(seconds);
        engine.poll();
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Device operations that [`FaultyDevice`] can be told to fail
    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Op {
        CreateOscillator,
        CreateGain,
        Start,
        Stop,
        Ramp,
        Cancel,
    }

    struct FaultyDevice {
        inner: RenderDevice,
        fail: Option<Op>,
    }

    impl FaultyDevice {
        fn new() -> Self {
            Self {
                inner: RenderDevice::new(RATE),
                fail: None,
            }
        }

        fn check(&self, op: Op) -> Result<(), DeviceError> {
            if self.fail == Some(op) {
                Err(DeviceError::InvalidValue {
                    what: "injected failure",
                    value: 0.0,
                })
            } else {
                Ok(())
            }
        }
    }

    impl AudioDevice for FaultyDevice {
        fn state(&self) -> DeviceState {
            self.inner.state()
        }

        fn resume(&mut self) -> Result<(), DeviceError> {
            self.inner.resume()
        }

        fn current_time(&self) -> f64 {
            self.inner.current_time()
        }

        fn destination(&self) -> NodeId {
            self.inner.destination()
        }

        fn create_oscillator(
            &mut self,
            waveform: Waveform,
            frequency: f64,
        ) -> Result<NodeId, DeviceError> {
            self.check(Op::CreateOscillator)?;
            self.inner.create_oscillator(waveform, frequency)
        }

        fn create_gain(&mut self) -> Result<NodeId, DeviceError> {
            self.check(Op::CreateGain)?;
            self.inner.create_gain()
        }

        fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), DeviceError> {
            self.inner.connect(from, to)
        }

        fn disconnect(&mut self, node: NodeId) {
            self.inner.disconnect(node)
        }

        fn set_value_at_time(
            &mut self,
            gain: NodeId,
            value: f64,
            time: f64,
        ) -> Result<(), DeviceError> {
            self.inner.set_value_at_time(gain, value, time)
        }

        fn linear_ramp_to_value_at_time(
            &mut self,
            gain: NodeId,
            value: f64,
            end_time: f64,
        ) -> Result<(), DeviceError> {
            self.check(Op::Ramp)?;
            self.inner.linear_ramp_to_value_at_time(gain, value, end_time)
        }

        fn exponential_ramp_to_value_at_time(
            &mut self,
            gain: NodeId,
            value: f64,
            end_time: f64,
        ) -> Result<(), DeviceError> {
            self.check(Op::Ramp)?;
            self.inner.exponential_ramp_to_value_at_time(gain, value, end_time)
        }

        fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), DeviceError> {
            self.check(Op::Cancel)?;
            self.inner.cancel_scheduled_values(gain, time)
        }

        fn gain_value_at(&self, gain: NodeId, time: f64) -> Result<f64, DeviceError> {
            self.inner.gain_value_at(gain, time)
        }

        fn start_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError> {
            self.check(Op::Start)?;
            self.inner.start_oscillator(oscillator, time)
        }

        fn stop_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError> {
            self.check(Op::Stop)?;
            self.inner.stop_oscillator(oscillator, time)
        }
    }

    fn faulty_engine() -> SynthEngine<FaultyDevice, EventLog> {
        SynthEngine::new(FaultyDevice::new(), EventLog::new(), EngineSettings::default())
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();

        assert!(!engine.is_inert());
        assert!(engine.master_node().is_some());
        assert_eq!(engine.master_volume(), 0.5);
        assert_eq!(engine.waveform(), Waveform::Sine);
        assert!(engine.active_notes().is_empty());
        // Only the master gain exists until a note plays
        assert_eq!(engine.device().live_nodes(), 1);
        assert_eq!(engine.device().state(), DeviceState::Suspended);
    }

    #[test]
    fn test_note_on_resumes_device_and_registers() {
        let mut engine = engine();

        engine.note_on("C4", 261.63).unwrap();

        assert_eq!(engine.device().state(), DeviceState::Running);
        assert!(engine.has("C4"));
        assert_eq!(engine.voice_state("C4"), Some(VoiceState::Attacking));
        assert_eq!(engine.observer().events(), &[VoiceEvent::Started("C4".to_string())]);
        assert_eq!(engine.device().live_oscillators(), 1);
    }

    #[test]
    fn test_duplicate_note_on_is_idempotent() {
        let mut engine = engine();

        engine.note_on("C4", 261.63).unwrap();
        advance(&mut engine, 0.02);
        engine.note_on("C4", 261.63).unwrap();

        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.observer().started(), 1);
        assert_eq!(engine.device().live_oscillators(), 1);
        assert_eq!(engine.voice("C4").map(Voice::start_time), Some(0.0));
    }

    #[test]
    fn test_sustain_reached_after_attack_and_decay() {
        let mut engine = engine();
        engine.note_on("C4", 261.63).unwrap();

        advance(&mut engine, 0.05);
        assert_eq!(engine.voice_state("C4"), Some(VoiceState::Attacking));

        advance(&mut engine, 0.05);
        assert_eq!(engine.voice_state("C4"), Some(VoiceState::Sustaining));
    }

    #[test]
    fn test_held_note_scenario() {
        let mut engine = engine();

        engine.note_on("C4", 261.63).unwrap();
        assert_eq!(engine.active_notes(), vec!["C4"]);

        advance(&mut engine, 0.1);
        assert_eq!(engine.voice_state("C4"), Some(VoiceState::Sustaining));

        engine.note_off("C4");
        assert_eq!(engine.voice_state("C4"), Some(VoiceState::Releasing));

        advance(&mut engine, 0.1);
        assert!(engine.registry().is_empty());
        assert_eq!(engine.observer().stops_of("C4"), 1);

        // Later polls do not notify again
        advance(&mut engine, 0.5);
        assert_eq!(engine.observer().stops_of("C4"), 1);
        assert_eq!(engine.device().live_nodes(), 1);
    }

    #[test]
    fn test_voice_lingers_until_release_completes() {
        let mut engine = engine();
        engine.note_on("E4", 329.63).unwrap();
        advance(&mut engine, 0.2);
        engine.note_off("E4");

        advance(&mut engine, 0.05);
        assert!(engine.has("E4"));
        assert_eq!(engine.observer().stops_of("E4"), 0);

        advance(&mut engine, 0.05);
        assert!(!engine.has("E4"));
        assert_eq!(engine.observer().stops_of("E4"), 1);
    }

    #[test]
    fn test_note_off_schedules_stop_at_release_end() {
        let mut engine = engine();
        engine.note_on("G4", 392.0).unwrap();
        advance(&mut engine, 0.2);

        let osc = engine.voice("G4").map(Voice::oscillator).unwrap();
        engine.note_off("G4");

        let deadline = engine.voice("G4").and_then(Voice::release_deadline).unwrap();
        assert!(close(deadline, 0.3));
        assert_eq!(engine.device().oscillator_window(osc).unwrap().1, Some(deadline));
    }

    #[test]
    fn test_release_mid_attack_uses_current_gain() {
        let mut engine = engine();
        engine.note_on("A4", 440.0).unwrap();
        let gain = engine.voice("A4").map(Voice::gain).unwrap();

        advance(&mut engine, 0.005);
        let released_at = engine.device().current_time();
        engine.note_off("A4");

        let events: Vec<AutomationEvent> = engine.device().gain_events(gain).unwrap().to_vec();
        let start = events
            .iter()
            .find(|e| e.kind == RampKind::Set && e.time == released_at)
            .copied()
            .unwrap();

        assert!(close(start.value, 0.15));
        assert!(!close(start.value, 0.3) && !close(start.value, 0.2));

        let last = events.last().copied().unwrap();
        assert_eq!(last.kind, RampKind::Exponential);
        assert_eq!(last.value, 0.01);
        assert!(close(last.time, released_at + 0.1));

        // The remainder of the attack and the decay were cancelled
        assert!(!events.iter().any(|e| e.kind == RampKind::Linear));
    }

    #[test]
    fn test_note_off_unknown_or_repeated_is_noop() {
        let mut engine = engine();
        engine.note_off("C4");
        assert!(engine.observer().events().is_empty());

        engine.note_on("C4", 261.63).unwrap();
        advance(&mut engine, 0.2);
        engine.note_off("C4");
        let deadline = engine.voice("C4").and_then(Voice::release_deadline);

        advance(&mut engine, 0.05);
        engine.note_off("C4");
        assert_eq!(engine.voice("C4").and_then(Voice::release_deadline), deadline);
    }

    #[test]
    fn test_master_volume_leaves_envelopes_alone() {
        let mut engine = engine();
        engine.note_on("C4", 261.63).unwrap();
        advance(&mut engine, 0.05);

        let gain = engine.voice("C4").map(Voice::gain).unwrap();
        let before = engine.device().gain_events(gain).unwrap().to_vec();

        engine.set_master_volume(0.7);

        assert_eq!(engine.device().gain_events(gain).unwrap(), before.as_slice());
        let master = engine.master_node().unwrap();
        let now = engine.device().current_time();
        assert_eq!(engine.device().gain_value_at(master, now).unwrap(), 0.7);
        assert_eq!(engine.master_volume(), 0.7);
    }

    #[test]
    fn test_master_volume_clamped() {
        let mut engine = engine();

        engine.set_master_volume(1.5);
        assert_eq!(engine.master_volume(), 1.0);

        engine.set_master_volume(-0.2);
        assert_eq!(engine.master_volume(), 0.0);

        engine.set_master_volume(f64::NAN);
        assert_eq!(engine.master_volume(), 0.0);
    }

    #[test]
    fn test_waveform_applies_to_new_voices_only() {
        let mut engine = engine();
        engine.note_on("C4", 261.63).unwrap();

        engine.set_waveform(Waveform::Square);
        engine.note_on("E4", 329.63).unwrap();
        engine.note_on_with("G4", 392.0, Waveform::Triangle).unwrap();

        assert_eq!(engine.voice("C4").map(Voice::waveform), Some(Waveform::Sine));
        assert_eq!(engine.voice("E4").map(Voice::waveform), Some(Waveform::Square));
        assert_eq!(engine.voice("G4").map(Voice::waveform), Some(Waveform::Triangle));
        assert_eq!(engine.waveform(), Waveform::Square);
    }

    #[test]
    fn test_rapid_retrigger_keeps_one_voice() {
        let mut engine = engine();

        engine.note_on_with("A4", 440.0, Waveform::Sine).unwrap();
        advance(&mut engine, 0.0005);
        engine.note_off("A4");
        assert_eq!(engine.registry().len(), 1);
        engine.note_on_with("A4", 440.0, Waveform::Square).unwrap();

        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.voice_state("A4"), Some(VoiceState::Attacking));
        assert_eq!(engine.voice("A4").map(Voice::waveform), Some(Waveform::Square));
        assert_eq!(
            engine.observer().events(),
            &[
                VoiceEvent::Started("A4".to_string()),
                VoiceEvent::Stopped("A4".to_string()),
                VoiceEvent::Started("A4".to_string()),
            ]
        );

        // The old voice still finishes its release tail
        assert_eq!(engine.release_tails(), 1);
        assert_eq!(engine.device().live_oscillators(), 2);

        advance(&mut engine, 0.1);
        assert_eq!(engine.release_tails(), 0);
        assert_eq!(engine.device().live_oscillators(), 1);
        assert!(engine.has("A4"));
        assert_eq!(engine.observer().stops_of("A4"), 1);

        engine.note_off("A4");
        advance(&mut engine, 0.1);
        assert!(!engine.has("A4"));
        assert_eq!(engine.observer().stops_of("A4"), 2);
        assert_eq!(engine.device().live_oscillators(), 0);
        assert_eq!(engine.device().live_nodes(), 1);
    }

    #[test]
    fn test_panic_drops_everything() {
        let mut engine = engine();
        engine.note_on("C4", 261.63).unwrap();
        engine.note_on("E4", 329.63).unwrap();
        engine.note_on("G4", 392.0).unwrap();
        advance(&mut engine, 0.01);
        engine.note_off("G4");
        engine.note_on("G4", 392.0).unwrap();

        engine.panic();

        assert!(engine.registry().is_empty());
        assert_eq!(engine.release_tails(), 0);
        assert_eq!(engine.device().live_nodes(), 1);
        assert_eq!(engine.observer().stops_of("C4"), 1);
        assert_eq!(engine.observer().stops_of("E4"), 1);
        assert_eq!(engine.observer().stops_of("G4"), 2);

        // Still usable afterwards
        engine.note_on("C4", 261.63).unwrap();
        assert!(engine.has("C4"));
    }

    #[test]
    fn test_invalid_frequency_is_rolled_back() {
        let mut engine = engine();

        engine.note_on("C4", -1.0).unwrap();

        assert!(!engine.has("C4"));
        assert_eq!(engine.observer().started(), 0);
        assert_eq!(engine.device().live_nodes(), 1);
    }

    #[test]
    fn test_note_on_failure_leaves_nothing_behind() {
        for op in [Op::CreateOscillator, Op::CreateGain, Op::Ramp, Op::Start] {
            let mut engine = faulty_engine();
            engine.device_mut().fail = Some(op);

            assert_eq!(engine.note_on("C4", 261.63), Ok(()), "{:?}", op);

            assert!(!engine.has("C4"), "{:?}", op);
            assert!(engine.observer().events().is_empty(), "{:?}", op);
            assert_eq!(engine.device().inner.live_nodes(), 1, "{:?}", op);

            // Recovers once the device behaves
            engine.device_mut().fail = None;
            engine.note_on("C4", 261.63).unwrap();
            assert!(engine.has("C4"));
        }
    }

    #[test]
    fn test_note_off_failure_forces_cleanup() {
        for op in [Op::Cancel, Op::Ramp, Op::Stop] {
            let mut engine = faulty_engine();
            engine.note_on("C4", 261.63).unwrap();
            engine.device_mut().fail = Some(op);

            engine.note_off("C4");

            assert!(!engine.has("C4"), "{:?}", op);
            assert_eq!(engine.observer().stops_of("C4"), 1, "{:?}", op);
            assert_eq!(engine.device().inner.live_oscillators(), 0, "{:?}", op);

            // No second notification when the deadline passes
            engine.device_mut().fail = None;
            engine.device_mut().inner.advance(0.2);
            engine.poll();
            assert_eq!(engine.observer().stops_of("C4"), 1, "{:?}", op);
        }
    }

    #[test]
    fn test_unavailable_device_makes_engine_inert() {
        let mut device = RenderDevice::new(RATE);
        device.fail("no output device");
        let mut engine = SynthEngine::new(device, EventLog::new(), EngineSettings::default());

        assert!(engine.is_inert());
        assert_eq!(engine.observer().errors().len(), 1);

        let err = SynthError::DeviceUnavailable("no output device".to_string());
        assert_eq!(engine.note_on("C4", 261.63), Err(err.clone()));
        assert_eq!(engine.note_on("E4", 329.63), Err(err));
        assert!(engine.active_notes().is_empty());

        // Surfaced only once
        assert_eq!(engine.observer().errors().len(), 1);
        engine.note_off("C4");
        engine.set_master_volume(0.3);
        engine.panic();
    }

    #[test]
    fn test_device_lost_mid_session() {
        let mut engine = engine();
        engine.note_on("C4", 261.63).unwrap();
        engine.device_mut().close();

        assert!(matches!(
            engine.note_on("E4", 329.63),
            Err(SynthError::DeviceUnavailable(_))
        ));

        assert!(engine.is_inert());
        assert!(engine.active_notes().is_empty());
        assert_eq!(engine.observer().stops_of("C4"), 1);
        assert_eq!(engine.observer().errors().len(), 1);
    }

    #[test]
    fn test_shared_device_rendered_elsewhere() {
        let shared = SharedDevice::new(RenderDevice::new(RATE));
        let renderer = shared.clone();
        let mut engine = SynthEngine::new(shared, EventLog::new(), EngineSettings::default());

        engine.note_on("A4", 440.0).unwrap();
        let mut buffer = vec![0.0f32; RATE as usize / 10];
        assert!(renderer.try_render(&mut buffer));
        engine.poll();

        assert_eq!(engine.voice_state("A4"), Some(VoiceState::Sustaining));
        assert!(buffer.iter().any(|&s| s.abs() > 0.0));
        // Master volume 0.5 times peak 0.3
        assert!(buffer.iter().all(|&s| s.abs() <= 0.15 + 1e-6));

        engine.note_off("A4");
        assert!(renderer.try_render(&mut buffer));
        engine.poll();
        assert!(!engine.has("A4"));
        assert_eq!(renderer.lock().live_oscillators(), 0);
    }
}
