//! The audio capability consumed by the voice engine

use std::fmt;

use crate::error::DeviceError;
use crate::synth::Waveform;

/// Opaque handle to a node in a device's audio graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Nodes may be created and scheduled, but the clock does not advance
    Suspended,
    Running,
    /// Permanently unusable
    Closed,
}

/// A clock-bearing audio device with a node graph and parameter automation.
///
/// All times are seconds on the device clock returned by [`current_time`].
/// Scheduling calls return immediately; the device applies them as its clock
/// passes the given times.
///
/// [`current_time`]: AudioDevice::current_time
pub trait AudioDevice {
    fn state(&self) -> DeviceState;

    /// Bring a suspended device to the running state, blocking until it is ready
    fn resume(&mut self) -> Result<(), DeviceError>;

    fn current_time(&self) -> f64;

    /// The final output node every sounding path must reach
    fn destination(&self) -> NodeId;

    fn create_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<NodeId, DeviceError>;

    /// Create a gain node. Its gain starts at 1.0 until automated.
    fn create_gain(&mut self) -> Result<NodeId, DeviceError>;

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), DeviceError>;

    /// Detach a node from the graph and release its resources.
    ///
    /// Unknown nodes are ignored, so releasing twice is harmless.
    fn disconnect(&mut self, node: NodeId);

    fn set_value_at_time(&mut self, gain: NodeId, value: f64, time: f64) -> Result<(), DeviceError>;

    fn linear_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), DeviceError>;

    /// Exponential ramp ending at `end_time`. `value` must be non-zero.
    fn exponential_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), DeviceError>;

    /// Drop every automation event scheduled at or after `time`
    fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), DeviceError>;

    /// The instantaneous automated gain at `time`
    fn gain_value_at(&self, gain: NodeId, time: f64) -> Result<f64, DeviceError>;

    fn start_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError>;

    fn stop_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError>;
}
