//! Centroid speed tracking.
//!
//! Velocity needs two centroids and a velocity delta needs three; the state
//! keeps only the last centroid and the last speed.
//!
//! Speed is measured in pixels per observation step. A step normally spans one
//! camera frame; when frames were dropped before reaching the tracker the
//! caller passes the wider step so a steady glide keeps a steady speed.

use crate::frame::Point;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackState {
    pub previous_centroid: Option<Point>,
    pub previous_velocity: Option<f64>,
}

impl TrackState {
    /// Fold one centroid into the state.
    ///
    /// Returns the absolute change in speed once three centroids have been seen.
    pub fn observe(self, centroid: Point) -> (TrackState, Option<f64>) {
        self.observe_after(centroid, 1)
    }

    /// Like `observe`, for a centroid seen `steps` frames after the previous one.
    pub fn observe_after(self, centroid: Point, steps: u64) -> (TrackState, Option<f64>) {
        let Some(previous) = self.previous_centroid else {
            return (
                TrackState {
                    previous_centroid: Some(centroid),
                    previous_velocity: None,
                },
                None,
            );
        };

        let velocity = centroid.distance(&previous) / steps.max(1) as f64;
        let delta = self
            .previous_velocity
            .map(|previous_velocity| (velocity - previous_velocity).abs());

        (
            TrackState {
                previous_centroid: Some(centroid),
                previous_velocity: Some(velocity),
            },
            delta,
        )
    }
}

/// Owns a `TrackState` for one session.
#[derive(Debug, Default)]
pub struct MotionTracker {
    state: TrackState,
}

impl MotionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, centroid: Point) -> Option<f64> {
        self.observe_after(centroid, 1)
    }

    pub fn observe_after(&mut self, centroid: Point, steps: u64) -> Option<f64> {
        let (state, delta) = self.state.observe_after(centroid, steps);
        self.state = state;
        delta
    }

    pub fn state(&self) -> TrackState {
        self.state
    }
}
