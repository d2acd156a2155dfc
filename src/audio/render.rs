//! In-process audio device
//!
//! Renders oscillators through gain nodes into a mono destination, one sample
//! at a time. The clock only advances while rendering, which makes the device
//! usable both behind a real-time output stream and as a deterministic clock in
//! offline rendering and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use log::{debug, error};

use super::{AudioDevice, AutomationEvent, DeviceState, NodeId, ParamTimeline};
use crate::error::DeviceError;
use crate::synth::{Oscillator, Waveform};

const DESTINATION: NodeId = NodeId(0);

enum NodeKind {
    Destination,
    Oscillator {
        source: Oscillator,
        start: Option<f64>,
        stop: Option<f64>,
    },
    Gain(ParamTimeline),
}

struct Node {
    kind: NodeKind,
    inputs: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
        }
    }
}

/// Audio device that synthesizes its graph in software
pub struct RenderDevice {
    sample_rate: u32,
    frames: u64,
    state: DeviceState,
    failure: Option<String>,
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
}

impl RenderDevice {
    /// Create a suspended device rendering at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(DESTINATION, Node::new(NodeKind::Destination));

        Self {
            sample_rate,
            frames: 0,
            state: DeviceState::Suspended,
            failure: None,
            nodes,
            next_id: 1,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Permanently close the device
    pub fn close(&mut self) {
        self.state = DeviceState::Closed;
    }

    /// Mark the device as having no audio capability at all
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("audio device failed: {}", reason);
        self.failure = Some(reason);
        self.state = DeviceState::Closed;
    }

    /// Number of nodes currently allocated, excluding the destination
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Number of oscillators currently allocated
    pub fn live_oscillators(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| matches!(node.kind, NodeKind::Oscillator { .. }))
            .count()
    }

    /// Scheduled automation of a gain node
    pub fn gain_events(&self, gain: NodeId) -> Result<&[AutomationEvent], DeviceError> {
        match &self.node(gain)?.kind {
            NodeKind::Gain(timeline) => Ok(timeline.events()),
            _ => Err(DeviceError::WrongNodeKind {
                node: gain,
                expected: "a gain",
            }),
        }
    }

    /// Scheduled start and stop times of an oscillator
    pub fn oscillator_window(
        &self,
        oscillator: NodeId,
    ) -> Result<(Option<f64>, Option<f64>), DeviceError> {
        match &self.node(oscillator)?.kind {
            NodeKind::Oscillator { start, stop, .. } => Ok((*start, *stop)),
            _ => Err(DeviceError::WrongNodeKind {
                node: oscillator,
                expected: "an oscillator",
            }),
        }
    }

    /// Fill `output` with mono samples and advance the clock.
    ///
    /// A device that is not running outputs silence and keeps its clock still.
    pub fn render(&mut self, output: &mut [f32]) {
        if self.state != DeviceState::Running {
            output.fill(0.0);
            return;
        }

        let plan = self.plan();
        let mut values = vec![0.0f64; plan.len()];
        let rate = self.sample_rate as f64;

        for sample in output.iter_mut() {
            let time = self.frames as f64 / rate;

            for (idx, (id, inputs)) in plan.iter().enumerate() {
                let input: f64 = inputs.iter().map(|&i| values[i]).sum();
                let Some(node) = self.nodes.get_mut(id) else {
                    continue;
                };
                values[idx] = match &mut node.kind {
                    NodeKind::Destination => input,
                    NodeKind::Gain(timeline) => input * timeline.value_at(time),
                    NodeKind::Oscillator { source, start, stop } => {
                        let started = start.is_some_and(|s| time >= s);
                        let stopped = stop.is_some_and(|s| time >= s);
                        if started && !stopped {
                            source.generate()
                        } else {
                            0.0
                        }
                    }
                };
            }

            // The destination is always evaluated last
            *sample = values.last().copied().unwrap_or(0.0) as f32;
            self.frames += 1;
        }

        let now = self.current_time();
        for node in self.nodes.values_mut() {
            if let NodeKind::Gain(timeline) = &mut node.kind {
                timeline.compact(now);
            }
        }
    }

    /// Render and discard `seconds` of audio
    pub fn advance(&mut self, seconds: f64) {
        let mut remaining = (seconds * self.sample_rate as f64).round() as usize;
        let mut scratch = [0.0f32; 256];
        while remaining > 0 {
            let len = remaining.min(scratch.len());
            self.render(&mut scratch[..len]);
            remaining -= len;
        }
    }

    /// Evaluation order: every node after its inputs, destination last.
    /// Each entry carries the plan indices of its inputs.
    fn plan(&self) -> Vec<(NodeId, Vec<usize>)> {
        let mut order = Vec::new();
        let mut visited = HashMap::new();
        self.visit(DESTINATION, &mut visited, &mut order);

        order
            .iter()
            .map(|id| {
                let inputs = self.nodes[id]
                    .inputs
                    .iter()
                    .filter_map(|input| visited.get(input).copied().flatten())
                    .collect();
                (*id, inputs)
            })
            .collect()
    }

    fn visit(
        &self,
        id: NodeId,
        visited: &mut HashMap<NodeId, Option<usize>>,
        order: &mut Vec<NodeId>,
    ) {
        if visited.contains_key(&id) {
            return;
        }
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        // In progress; a cycle back to this node contributes nothing
        visited.insert(id, None);
        for &input in &node.inputs {
            self.visit(input, visited, order);
        }
        visited.insert(id, Some(order.len()));
        order.push(id);
    }

    fn node(&self, id: NodeId) -> Result<&Node, DeviceError> {
        self.nodes.get(&id).ok_or(DeviceError::UnknownNode(id))
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.state == DeviceState::Closed {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> DeviceError {
        match &self.failure {
            Some(reason) => DeviceError::Unavailable(reason.clone()),
            None => DeviceError::Closed,
        }
    }

    fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, DeviceError> {
        self.ensure_open()?;
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind));
        Ok(id)
    }

    fn timeline_mut(&mut self, gain: NodeId) -> Result<&mut ParamTimeline, DeviceError> {
        self.ensure_open()?;
        let node = self.nodes.get_mut(&gain).ok_or(DeviceError::UnknownNode(gain))?;
        match &mut node.kind {
            NodeKind::Gain(timeline) => Ok(timeline),
            _ => Err(DeviceError::WrongNodeKind {
                node: gain,
                expected: "a gain",
            }),
        }
    }

    fn oscillator_mut(
        &mut self,
        oscillator: NodeId,
        time: f64,
    ) -> Result<(&mut Option<f64>, &mut Option<f64>), DeviceError> {
        self.ensure_open()?;
        if !(time.is_finite() && time >= 0.0) {
            return Err(DeviceError::InvalidTime(time));
        }
        let node = self
            .nodes
            .get_mut(&oscillator)
            .ok_or(DeviceError::UnknownNode(oscillator))?;
        match &mut node.kind {
            NodeKind::Oscillator { start, stop, .. } => Ok((start, stop)),
            _ => Err(DeviceError::WrongNodeKind {
                node: oscillator,
                expected: "an oscillator",
            }),
        }
    }
}

impl AudioDevice for RenderDevice {
    fn state(&self) -> DeviceState {
        self.state
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.state = DeviceState::Running;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }

    fn create_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<NodeId, DeviceError> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(DeviceError::InvalidValue {
                what: "frequency",
                value: frequency,
            });
        }
        let source = Oscillator::new(waveform, frequency, self.sample_rate as f64);
        self.add_node(NodeKind::Oscillator {
            source,
            start: None,
            stop: None,
        })
    }

    fn create_gain(&mut self) -> Result<NodeId, DeviceError> {
        self.add_node(NodeKind::Gain(ParamTimeline::new(1.0)))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.node(from)?;
        let target = self.nodes.get_mut(&to).ok_or(DeviceError::UnknownNode(to))?;
        if matches!(target.kind, NodeKind::Oscillator { .. }) {
            return Err(DeviceError::WrongNodeKind {
                node: to,
                expected: "an input-accepting node",
            });
        }
        if !target.inputs.contains(&from) {
            target.inputs.push(from);
        }
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) {
        if node == DESTINATION || self.nodes.remove(&node).is_none() {
            return;
        }
        for other in self.nodes.values_mut() {
            other.inputs.retain(|&input| input != node);
        }
        debug!("released audio node {}", node);
    }

    fn set_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        time: f64,
    ) -> Result<(), DeviceError> {
        self.timeline_mut(gain)?.set_value_at_time(value, time)
    }

    fn linear_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), DeviceError> {
        self.timeline_mut(gain)?.linear_ramp_to_value_at_time(value, end_time)
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), DeviceError> {
        self.timeline_mut(gain)?.exponential_ramp_to_value_at_time(value, end_time)
    }

    fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), DeviceError> {
        self.timeline_mut(gain)?.cancel_scheduled_values(time)
    }

    fn gain_value_at(&self, gain: NodeId, time: f64) -> Result<f64, DeviceError> {
        self.ensure_open()?;
        match &self.node(gain)?.kind {
            NodeKind::Gain(timeline) => Ok(timeline.value_at(time)),
            _ => Err(DeviceError::WrongNodeKind {
                node: gain,
                expected: "a gain",
            }),
        }
    }

    fn start_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError> {
        let (start, _) = self.oscillator_mut(oscillator, time)?;
        if start.is_some() {
            return Err(DeviceError::AlreadyStarted(oscillator));
        }
        *start = Some(time);
        Ok(())
    }

    fn stop_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError> {
        let (_, stop) = self.oscillator_mut(oscillator, time)?;
        *stop = Some(time);
        Ok(())
    }
}

/// A [`RenderDevice`] shared between the engine and an output stream callback.
///
/// Every call takes the lock, so scheduling from the engine and rendering
/// from the audio thread never interleave.
#[derive(Clone)]
pub struct SharedDevice {
    inner: Arc<Mutex<RenderDevice>>,
}

impl SharedDevice {
    pub fn new(device: RenderDevice) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Lock the device, recovering it if a renderer panicked while holding it
    pub fn lock(&self) -> MutexGuard<'_, RenderDevice> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Render without blocking. Returns `false` and outputs silence when the
    /// device is busy.
    pub fn try_render(&self, output: &mut [f32]) -> bool {
        let mut device = match self.inner.try_lock() {
            Ok(device) => device,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                output.fill(0.0);
                return false;
            }
        };
        device.render(output);
        true
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.lock().fail(reason);
    }
}

impl AudioDevice for SharedDevice {
    fn state(&self) -> DeviceState {
        self.lock().state()
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.lock().resume()
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }

    fn create_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<NodeId, DeviceError> {
        self.lock().create_oscillator(waveform, frequency)
    }

    fn create_gain(&mut self) -> Result<NodeId, DeviceError> {
        self.lock().create_gain()
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), DeviceError> {
        self.lock().connect(from, to)
    }

    fn disconnect(&mut self, node: NodeId) {
        self.lock().disconnect(node)
    }

    fn set_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        time: f64,
    ) -> Result<(), DeviceError> {
        self.lock().set_value_at_time(gain, value, time)
    }

    fn linear_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), DeviceError> {
        self.lock().linear_ramp_to_value_at_time(gain, value, end_time)
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), DeviceError> {
        self.lock().exponential_ramp_to_value_at_time(gain, value, end_time)
    }

    fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), DeviceError> {
        self.lock().cancel_scheduled_values(gain, time)
    }

    fn gain_value_at(&self, gain: NodeId, time: f64) -> Result<f64, DeviceError> {
        self.lock().gain_value_at(gain, time)
    }

    fn start_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError> {
        self.lock().start_oscillator(oscillator, time)
    }

    fn stop_oscillator(&mut self, oscillator: NodeId, time: f64) -> Result<(), DeviceError> {
        self.lock().stop_oscillator(oscillator, time)
    }
}
