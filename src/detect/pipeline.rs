//! Per-session detection pipeline.
//!
//! One `ShotDetector` per session: segmenter (with its own background model),
//! blob extraction, motion tracker and trigger, run once per frame.

use crate::detect::background::BackgroundParams;
use crate::detect::blob::{extract, Blob, DEFAULT_MIN_AREA};
use crate::detect::color::ColorRange;
use crate::detect::segment::Segmenter;
use crate::detect::tracker::{MotionTracker, TrackState};
use crate::detect::trigger::{EventTrigger, ShotEvent};
use crate::frame::Frame;

/// Velocity-change threshold used when none is configured.
pub const DEFAULT_VELOCITY_THRESHOLD: f64 = 20000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorSettings {
    pub color_range: ColorRange,
    pub min_area: u32,
    pub velocity_threshold: f64,
    pub background: BackgroundParams,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            color_range: ColorRange::default(),
            min_area: DEFAULT_MIN_AREA,
            velocity_threshold: DEFAULT_VELOCITY_THRESHOLD,
            background: BackgroundParams::default(),
        }
    }
}

/// What one frame produced.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameAnalysis {
    /// Selected marker region, if any.
    pub blob: Option<Blob>,
    /// Speed change, once three centroids have been tracked.
    pub velocity_delta: Option<f64>,
    pub event: Option<ShotEvent>,
}

pub struct ShotDetector {
    segmenter: Segmenter,
    min_area: u32,
    tracker: MotionTracker,
    trigger: EventTrigger,
    last_sequence: Option<u64>,
    /// Frames that never reached this detector since the last centroid.
    missed_since_centroid: u64,
}

impl ShotDetector {
    pub fn new(settings: &DetectorSettings) -> Self {
        Self {
            segmenter: Segmenter::new(settings.color_range, settings.background),
            min_area: settings.min_area,
            tracker: MotionTracker::new(),
            trigger: EventTrigger::new(settings.velocity_threshold),
            last_sequence: None,
            missed_since_centroid: 0,
        }
    }

    /// Run one frame through the pipeline.
    ///
    /// Frames are expected in acquisition order. A jump in `frame.sequence`
    /// means frames were dropped upstream; the tracker is told how many frames
    /// the next centroid spans so dropped frames do not read as acceleration.
    /// Processed frames without a marker do not widen the span.
    pub fn process(&mut self, frame: &Frame) -> FrameAnalysis {
        if let Some(last) = self.last_sequence {
            self.missed_since_centroid += frame.sequence.saturating_sub(last + 1);
        }
        self.last_sequence = Some(frame.sequence);

        let mask = self.segmenter.segment(frame);
        let Some(blob) = extract(&mask, self.min_area) else {
            return FrameAnalysis::default();
        };

        let centroid = blob.centroid();
        let steps = 1 + std::mem::take(&mut self.missed_since_centroid);
        let velocity_delta = self.tracker.observe_after(centroid, steps);
        let event = velocity_delta.and_then(|delta| self.trigger.evaluate(delta, centroid));

        FrameAnalysis {
            blob: Some(blob),
            velocity_delta,
            event,
        }
    }

    pub fn track_state(&self) -> TrackState {
        self.tracker.state()
    }
}
