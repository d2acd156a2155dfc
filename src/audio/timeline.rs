//! Parameter automation timeline
//!
//! Holds the scheduled value changes of a single parameter (a gain) and
//! evaluates the parameter at any point in time. Ramps run from the value and
//! time of the preceding event to their own value and time.

use crate::error::DeviceError;

/// How an automation event reaches its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampKind {
    /// Jump to the value at the event time
    Set,
    Linear,
    Exponential,
}

/// A single scheduled change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub kind: RampKind,
    pub value: f64,
    pub time: f64,
}

/// Ordered automation events for one parameter
#[derive(Debug, Clone)]
pub struct ParamTimeline {
    default_value: f64,
    events: Vec<AutomationEvent>,
}

impl ParamTimeline {
    /// Create an empty timeline that holds `default_value` until automated
    pub fn new(default_value: f64) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    /// Scheduled events in time order
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> Result<(), DeviceError> {
        self.schedule(RampKind::Set, value, time)
    }

    pub fn linear_ramp_to_value_at_time(
        &mut self,
        value: f64,
        time: f64,
    ) -> Result<(), DeviceError> {
        self.schedule(RampKind::Linear, value, time)
    }

    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f64,
        time: f64,
    ) -> Result<(), DeviceError> {
        if !(value.is_finite() && value > 0.0) {
            return Err(DeviceError::InvalidValue {
                what: "exponential ramp target",
                value,
            });
        }
        self.schedule(RampKind::Exponential, value, time)
    }

    /// Remove every event scheduled at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) -> Result<(), DeviceError> {
        check_time(time)?;
        self.events.retain(|event| event.time < time);
        Ok(())
    }

    /// Evaluate the parameter at `time`
    pub fn value_at(&self, time: f64) -> f64 {
        let mut prev_value = self.default_value;
        let mut prev_time = 0.0;

        for event in &self.events {
            if event.time <= time {
                prev_value = event.value;
                prev_time = event.time;
                continue;
            }

            // First event still in the future decides the shape up to it
            let progress = (time - prev_time) / (event.time - prev_time);
            return match event.kind {
                RampKind::Set => prev_value,
                RampKind::Linear => prev_value + (event.value - prev_value) * progress,
                RampKind::Exponential => {
                    // Undefined through zero or across a sign change: hold
                    if prev_value == 0.0 || prev_value.signum() != event.value.signum() {
                        prev_value
                    } else {
                        prev_value * (event.value / prev_value).powf(progress)
                    }
                }
            };
        }

        prev_value
    }

    /// Drop history older than `now`, keeping the latest past event as the
    /// anchor for ramps still in flight. Values at or after `now` are unchanged.
    pub fn compact(&mut self, now: f64) {
        let past = self.events.partition_point(|event| event.time <= now);
        if past > 1 {
            self.events.drain(..past - 1);
        }
    }

    fn schedule(&mut self, kind: RampKind, value: f64, time: f64) -> Result<(), DeviceError> {
        check_time(time)?;
        if !value.is_finite() {
            return Err(DeviceError::InvalidValue {
                what: "automation value",
                value,
            });
        }

        // Events at the same time keep insertion order
        let idx = self.events.partition_point(|event| event.time <= time);
        self.events.insert(idx, AutomationEvent { kind, value, time });
        Ok(())
    }
}

fn check_time(time: f64) -> Result<(), DeviceError> {
    if time.is_finite() && time >= 0.0 {
        Ok(())
    } else {
        Err(DeviceError::InvalidTime(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_default_value_until_automated() {
        let timeline = ParamTimeline::new(1.0);
        assert_eq!(timeline.value_at(0.0), 1.0);
        assert_eq!(timeline.value_at(10.0), 1.0);
    }

    #[test]
    fn test_linear_ramp() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.0, 1.0).unwrap();
        timeline.linear_ramp_to_value_at_time(0.4, 2.0).unwrap();

        assert!(close(timeline.value_at(1.0), 0.0));
        assert!(close(timeline.value_at(1.5), 0.2));
        assert!(close(timeline.value_at(1.75), 0.3));
        assert!(close(timeline.value_at(2.0), 0.4));
        assert!(close(timeline.value_at(5.0), 0.4));
    }

    #[test]
    fn test_exponential_ramp() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.4, 0.0).unwrap();
        timeline.exponential_ramp_to_value_at_time(0.1, 1.0).unwrap();

        // Halfway through an exponential ramp is the geometric mean
        assert!(close(timeline.value_at(0.5), 0.2));
        assert!(close(timeline.value_at(1.0), 0.1));
    }

    #[test]
    fn test_exponential_ramp_from_zero_holds() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.0, 0.0).unwrap();
        timeline.exponential_ramp_to_value_at_time(0.5, 1.0).unwrap();

        assert_eq!(timeline.value_at(0.5), 0.0);
        assert_eq!(timeline.value_at(1.0), 0.5);
    }

    #[test]
    fn test_exponential_ramp_to_zero_rejected() {
        let mut timeline = ParamTimeline::new(1.0);
        assert!(timeline.exponential_ramp_to_value_at_time(0.0, 1.0).is_err());
        assert!(timeline.events().is_empty());
    }

    #[test]
    fn test_exponential_ramp_to_negative_rejected() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.3, 0.0).unwrap();

        assert_eq!(
            timeline.exponential_ramp_to_value_at_time(-0.5, 1.0),
            Err(DeviceError::InvalidValue {
                what: "exponential ramp target",
                value: -0.5,
            })
        );
        assert!(timeline.exponential_ramp_to_value_at_time(f64::INFINITY, 1.0).is_err());
        assert_eq!(timeline.events().len(), 1);
    }

    #[test]
    fn test_invalid_times_rejected() {
        let mut timeline = ParamTimeline::new(1.0);
        assert_eq!(
            timeline.set_value_at_time(0.5, -0.1),
            Err(DeviceError::InvalidTime(-0.1))
        );
        assert!(timeline.set_value_at_time(0.5, f64::NAN).is_err());
        assert!(timeline.set_value_at_time(f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_cancel_removes_future_events() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.0, 0.0).unwrap();
        timeline.linear_ramp_to_value_at_time(0.3, 0.01).unwrap();
        timeline.exponential_ramp_to_value_at_time(0.2, 0.1).unwrap();

        timeline.cancel_scheduled_values(0.005).unwrap();

        assert_eq!(timeline.events().len(), 1);
        assert_eq!(timeline.value_at(0.05), 0.0);
    }

    #[test]
    fn test_same_time_events_keep_insertion_order() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.5, 1.0).unwrap();
        timeline.set_value_at_time(0.7, 1.0).unwrap();

        assert_eq!(timeline.value_at(1.0), 0.7);
    }

    #[test]
    fn test_compact_preserves_future_values() {
        let mut timeline = ParamTimeline::new(1.0);
        timeline.set_value_at_time(0.0, 0.0).unwrap();
        timeline.linear_ramp_to_value_at_time(0.3, 0.01).unwrap();
        timeline.exponential_ramp_to_value_at_time(0.2, 0.1).unwrap();

        let before = timeline.value_at(0.05);
        timeline.compact(0.02);

        assert_eq!(timeline.events().len(), 2);
        assert!(close(timeline.value_at(0.05), before));
    }
}
