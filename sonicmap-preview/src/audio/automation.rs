//! Gain automation timeline
//!
//! A small subset of a scheduled audio parameter: instantaneous value changes
//! and linear ramps, both keyed on device time in seconds. The mixer samples
//! the timeline once per output frame.
//!
//! Evaluation rules:
//! - Before the first event the parameter holds its initial value.
//! - `Set` takes effect at its time and holds.
//! - `LinearRamp` interpolates from the previous event's (time, value) to its own.

/// Kind of scheduled change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationKind {
    Set,
    LinearRamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub time: f64,
    pub value: f32,
    pub kind: AutomationKind,
}

#[derive(Debug, Clone)]
pub struct GainAutomation {
    initial: f32,
    events: Vec<AutomationEvent>,
}

impl GainAutomation {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent {
            time,
            value,
            kind: AutomationKind::Set,
        });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent {
            time,
            value,
            kind: AutomationKind::LinearRamp,
        });
    }

    /// Drop every event after `time` and hold the value the timeline had there.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.retain(|event| event.time < time);
        self.set_value_at_time(held, time);
    }

    /// Ramp from the current value to `value`, replacing anything scheduled later.
    pub fn ramp_from_now(&mut self, value: f32, now: f64, end: f64) {
        self.cancel_and_hold_at_time(now);
        self.linear_ramp_to_value_at_time(value, end.max(now));
    }

    /// Gain at device time `time`
    pub fn value_at(&self, time: f64) -> f32 {
        let mut prev: Option<(f64, f32)> = None;

        for event in &self.events {
            if event.time <= time {
                prev = Some((event.time, event.value));
                continue;
            }

            // First event strictly in the future
            return match (event.kind, prev) {
                (AutomationKind::LinearRamp, Some((prev_time, prev_value))) => {
                    let span = event.time - prev_time;
                    if span <= 0.0 {
                        return event.value;
                    }
                    let progress = ((time - prev_time) / span) as f32;
                    prev_value + (event.value - prev_value) * progress
                }
                (_, Some((_, prev_value))) => prev_value,
                (_, None) => self.initial,
            };
        }

        prev.map(|(_, value)| value).unwrap_or(self.initial)
    }

    /// Time after which the value never changes again
    pub fn settled_after(&self) -> f64 {
        self.events.last().map(|event| event.time).unwrap_or(f64::NEG_INFINITY)
    }

    /// Value once every scheduled event has passed
    pub fn final_value(&self) -> f32 {
        self.events.last().map(|event| event.value).unwrap_or(self.initial)
    }

    /// Keep events time-ordered; equal times keep insertion order.
    fn insert(&mut self, event: AutomationEvent) {
        let index = self.events.partition_point(|existing| existing.time <= event.time);
        self.events.insert(index, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn envelope() -> GainAutomation {
        // Fade in 0 -> 0.4 over 150ms, hold, fade out over final 300ms of 6s
        let mut gain = GainAutomation::new(0.0);
        gain.set_value_at_time(0.0, 0.0);
        gain.linear_ramp_to_value_at_time(0.4, 0.15);
        gain.set_value_at_time(0.4, 5.7);
        gain.linear_ramp_to_value_at_time(0.0, 6.0);
        gain
    }

    #[test]
    fn test_initial_value_before_events() {
        let mut gain = GainAutomation::new(1.0);
        gain.set_value_at_time(0.0, 2.0);
        assert_eq!(gain.value_at(1.0), 1.0);
        assert_eq!(gain.value_at(2.0), 0.0);
    }

    #[test]
    fn test_fade_in_is_linear() {
        let gain = envelope();
        assert!((gain.value_at(0.0) - 0.0).abs() < EPSILON);
        assert!((gain.value_at(0.075) - 0.2).abs() < EPSILON);
        assert!((gain.value_at(0.15) - 0.4).abs() < EPSILON);
    }

    #[test]
    fn test_hold_and_fade_out() {
        let gain = envelope();
        assert!((gain.value_at(3.0) - 0.4).abs() < EPSILON);
        assert!((gain.value_at(5.85) - 0.2).abs() < EPSILON);
        assert_eq!(gain.value_at(6.0), 0.0);
        assert_eq!(gain.value_at(10.0), 0.0);
    }

    #[test]
    fn test_ramp_from_now_replaces_scheduled_fade() {
        let mut gain = envelope();
        gain.ramp_from_now(0.0, 1.0, 1.1);

        assert!((gain.value_at(1.0) - 0.4).abs() < EPSILON);
        assert!((gain.value_at(1.05) - 0.2).abs() < EPSILON);
        assert_eq!(gain.value_at(1.1), 0.0);
        // The old 5.7s hold must be gone
        assert_eq!(gain.value_at(5.8), 0.0);
        assert_eq!(gain.settled_after(), 1.1);
        assert_eq!(gain.final_value(), 0.0);
    }

    #[test]
    fn test_ramp_from_now_mid_fade_in_starts_from_current_value() {
        let mut gain = envelope();
        gain.ramp_from_now(0.0, 0.075, 0.175);

        assert!((gain.value_at(0.075) - 0.2).abs() < EPSILON);
        assert!((gain.value_at(0.125) - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_events_stay_sorted() {
        let mut gain = GainAutomation::new(0.0);
        gain.linear_ramp_to_value_at_time(1.0, 2.0);
        gain.set_value_at_time(0.5, 1.0);

        let times: Vec<f64> = gain.events().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 2.0]);
        assert!((gain.value_at(1.5) - 0.75).abs() < EPSILON);
    }
}
