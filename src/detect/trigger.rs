//! Shot decision: a velocity change above the threshold becomes an event.

use crate::frame::Point;

/// A detected impact, emitted once and written to the client.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShotEvent {
    pub x: i32,
    pub y: i32,
    pub observed_velocity_delta: f64,
}

impl ShotEvent {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Fires when the velocity delta strictly exceeds the threshold.
pub fn evaluate(velocity_delta: f64, threshold: f64, at: Point) -> Option<ShotEvent> {
    (velocity_delta > threshold).then_some(ShotEvent {
        x: at.x,
        y: at.y,
        observed_velocity_delta: velocity_delta,
    })
}

/// Threshold fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct EventTrigger {
    threshold: f64,
}

impl EventTrigger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, velocity_delta: f64, at: Point) -> Option<ShotEvent> {
        evaluate(velocity_delta, self.threshold, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_does_not_fire() {
        let trigger = EventTrigger::new(12.5);
        assert!(trigger.evaluate(12.5, Point::new(1, 2)).is_none());
        assert!(trigger.evaluate(12.4, Point::new(1, 2)).is_none());
    }

    #[test]
    fn exceeding_fires_at_position() {
        let event = evaluate(50.0, 0.0, Point::new(150, 100)).expect("event");
        assert_eq!(event.position(), Point::new(150, 100));
        assert_eq!(event.observed_velocity_delta, 50.0);
    }

    #[test]
    fn zero_delta_never_fires_for_positive_threshold() {
        for threshold in [0.001, 1.0, 20000.0] {
            assert!(evaluate(0.0, threshold, Point::new(0, 0)).is_none());
        }
    }
}
