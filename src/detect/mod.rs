//! Marker detection: segmentation, blob selection, motion tracking, triggering.

pub mod background;
pub mod blob;
pub mod color;
mod pipeline;
pub mod segment;
pub mod tracker;
pub mod trigger;

pub use background::{BackgroundModel, BackgroundParams};
pub use blob::{extract, Blob, DEFAULT_MIN_AREA};
pub use color::{rgb_to_hsv, ColorRange, Hsv};
pub use pipeline::{DetectorSettings, FrameAnalysis, ShotDetector, DEFAULT_VELOCITY_THRESHOLD};
pub use segment::{segment, Segmenter};
pub use tracker::{MotionTracker, TrackState};
pub use trigger::{EventTrigger, ShotEvent};
