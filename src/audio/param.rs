/// How the value approaches a scheduled event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ramp {
    /// Jump to the value at the event time
    Step,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub ramp: Ramp,
    pub value: f32,
    pub time: f64,
}

/// A value with a timeline of scheduled changes, evaluated once per sample
/// by the node that owns it. Times are in seconds on whatever clock the owner
/// uses: voice-local time for graph nodes, engine time for the bus.
#[derive(Debug, Clone)]
pub struct Param {
    value: f32,
    events: Vec<Event>,
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    /// Assign the value immediately, dropping every scheduled event
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.events.clear();
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(Event {
            ramp: Ramp::Step,
            value,
            time,
        })
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(Event {
            ramp: Ramp::Linear,
            value,
            time,
        })
    }

    /// Exponential curves cannot reach or cross zero, so the target must be positive.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) -> &mut Self {
        debug_assert!(value > 0.0, "exponential ramp target must be positive");
        self.insert(Event {
            ramp: Ramp::Exponential,
            value: value.max(f32::MIN_POSITIVE),
            time,
        })
    }

    /// Collapse the timeline to a single step holding the value at `time`
    pub fn hold_at(&mut self, time: f64) -> &mut Self {
        let current = self.value_at(time);
        self.events.clear();
        self.set_value_at_time(current, time)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn value_at(&self, time: f64) -> f32 {
        let mut value = self.value;
        let mut from = 0.0;

        for event in &self.events {
            if event.time <= time {
                value = event.value;
                from = event.time;
                continue;
            }

            let span = event.time - from;
            if span <= 0.0 {
                return value;
            }
            let progress = ((time - from) / span) as f32;

            return match event.ramp {
                Ramp::Step => value,
                Ramp::Linear => value + (event.value - value) * progress,
                Ramp::Exponential => {
                    if value == 0.0 || value.signum() != event.value.signum() {
                        value
                    } else {
                        value * (event.value / value).powf(progress)
                    }
                }
            };
        }

        value
    }

    fn insert(&mut self, event: Event) -> &mut Self {
        // equal times keep insertion order
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_constant_without_events() {
        let param = Param::new(0.5);
        assert_eq!(param.value_at(0.0), 0.5);
        assert_eq!(param.value_at(10.0), 0.5);
    }

    #[test]
    fn test_linear_ramp_from_start() {
        let mut param = Param::new(0.0);
        param.linear_ramp_to_value_at_time(1.0, 1.0);
        assert!(close(param.value_at(0.25), 0.25));
        assert!(close(param.value_at(0.5), 0.5));
        assert_eq!(param.value_at(2.0), 1.0);
    }

    #[test]
    fn test_exponential_ramp_midpoint_is_geometric_mean() {
        let mut param = Param::new(1.0);
        param
            .set_value_at_time(1.0, 0.0)
            .exponential_ramp_to_value_at_time(0.01, 0.2);
        assert!(close(param.value_at(0.1), 0.1));
        assert!(close(param.value_at(0.2), 0.01));
    }

    #[test]
    fn test_exponential_ramp_from_zero_holds_until_event() {
        let mut param = Param::new(0.0);
        param.exponential_ramp_to_value_at_time(0.5, 1.0);
        assert_eq!(param.value_at(0.99), 0.0);
        assert_eq!(param.value_at(1.0), 0.5);
    }

    #[test]
    fn test_equal_times_keep_insertion_order() {
        // attack, then a hold point at the same instant, then decay
        let mut param = Param::new(0.0);
        param
            .set_value_at_time(0.0, 0.0)
            .linear_ramp_to_value_at_time(0.35, 0.1)
            .set_value_at_time(0.35, 0.1)
            .exponential_ramp_to_value_at_time(0.3, 0.3);
        assert!(close(param.value_at(0.05), 0.175));
        assert!(close(param.value_at(0.1), 0.35));
        let mid = param.value_at(0.2);
        assert!(mid < 0.35 && mid > 0.3);
    }

    #[test]
    fn test_hold_at_collapses_timeline() {
        let mut param = Param::new(1.0);
        param.linear_ramp_to_value_at_time(0.0, 1.0);
        param.hold_at(0.5);
        assert_eq!(param.events().len(), 1);
        assert!(close(param.value_at(0.5), 0.5));
        assert!(close(param.value_at(3.0), 0.5));
    }

    #[test]
    fn test_set_value_clears_events() {
        let mut param = Param::new(1.0);
        param.linear_ramp_to_value_at_time(0.0, 1.0);
        param.set_value(0.3);
        assert!(param.events().is_empty());
        assert_eq!(param.value_at(0.5), 0.3);
    }
}
