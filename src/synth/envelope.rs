//! ADSR envelope scheduling
//!
//! Voices do not compute their amplitude sample by sample. Instead the attack,
//! decay and release segments are scheduled once as gain automation on the
//! audio device, relative to its clock.

use crate::audio::{AudioDevice, NodeId};
use crate::error::DeviceError;

/// Amplitude envelope applied to every voice.
///
/// Times are in seconds, levels are linear gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    /// Linear ramp from silence to `peak`
    pub attack: f64,
    /// Exponential ramp from `peak` down to `sustain`
    pub decay: f64,
    pub peak: f64,
    pub sustain: f64,
    /// Exponential ramp from the current level down to `release_floor`
    pub release: f64,
    /// End of the release ramp. Exponential ramps cannot reach zero.
    pub release_floor: f64,
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.09,
            peak: 0.3,
            sustain: 0.2,
            release: 0.1,
            release_floor: 0.01,
        }
    }
}

impl EnvelopeShape {
    /// Time from note-on until the sustain level is reached
    pub fn onset(&self) -> f64 {
        self.attack + self.decay
    }

    /// Nominal level `elapsed` seconds after note-on while the note is held
    pub fn held_level(&self, elapsed: f64) -> f64 {
        if elapsed <= 0.0 {
            0.0
        } else if elapsed < self.attack {
            self.peak * elapsed / self.attack
        } else if elapsed < self.onset() {
            let progress = (elapsed - self.attack) / self.decay;
            self.peak * (self.sustain / self.peak).powf(progress)
        } else {
            self.sustain
        }
    }

    /// Level a release from `start_level` ends at. A release never rises:
    /// starting below the floor, it holds the starting level.
    pub fn release_target(&self, start_level: f64) -> f64 {
        if start_level > 0.0 {
            self.release_floor.min(start_level)
        } else {
            self.release_floor
        }
    }

    /// Level `elapsed` seconds into a release that started at `start_level`
    pub fn released_level(&self, start_level: f64, elapsed: f64) -> f64 {
        let target = self.release_target(start_level);
        if start_level <= 0.0 {
            // A ramp from silence holds until its end
            return if elapsed >= self.release { target } else { start_level };
        }
        let progress = (elapsed / self.release).clamp(0.0, 1.0);
        start_level * (target / start_level).powf(progress)
    }
}

/// Result of scheduling a release
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleasePlan {
    /// Gain the release ramp starts from
    pub start_level: f64,
    /// Clock time at which the ramp ends and the oscillator is halted
    pub deadline: f64,
}

/// Schedules envelope segments on a device
#[derive(Debug, Clone)]
pub struct EnvelopeScheduler {
    shape: EnvelopeShape,
}

impl EnvelopeScheduler {
    pub fn new(shape: EnvelopeShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &EnvelopeShape {
        &self.shape
    }

    /// Schedule attack and decay on `gain` starting at `start`.
    ///
    /// Returns the time the sustain level is reached.
    pub fn schedule_attack<D: AudioDevice + ?Sized>(
        &self,
        device: &mut D,
        gain: NodeId,
        start: f64,
    ) -> Result<f64, DeviceError> {
        let shape = &self.shape;
        let sustain_at = start + shape.onset();

        device.set_value_at_time(gain, 0.0, start)?;
        device.linear_ramp_to_value_at_time(gain, shape.peak, start + shape.attack)?;
        device.exponential_ramp_to_value_at_time(gain, shape.sustain, sustain_at)?;

        Ok(sustain_at)
    }

    /// Release `gain` from whatever level it has at `time` and halt
    /// `oscillator` exactly when the release ramp ends.
    ///
    /// Releasing mid-attack or mid-decay starts from the level actually reached,
    /// never from the nominal sustain level.
    pub fn schedule_release<D: AudioDevice + ?Sized>(
        &self,
        device: &mut D,
        gain: NodeId,
        oscillator: NodeId,
        time: f64,
    ) -> Result<ReleasePlan, DeviceError> {
        let shape = &self.shape;
        let deadline = time + shape.release;

        // Read before cancelling: cancellation drops the ramp in progress
        let start_level = device.gain_value_at(gain, time)?;

        device.cancel_scheduled_values(gain, time)?;
        device.set_value_at_time(gain, start_level, time)?;
        let floor = shape.release_target(start_level);
        device.exponential_ramp_to_value_at_time(gain, floor, deadline)?;
        device.stop_oscillator(oscillator, deadline)?;

        Ok(ReleasePlan {
            start_level,
            deadline,
        })
    }
}
