//! Frame ingestion.
//!
//! This module provides the camera sources and the hub that owns them:
//! - Synthetic camera (`stub://` device paths) for demos and tests
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - `CameraHub`: the single owner of the physical device, fanning frames
//!   out to every active session
//!
//! Sessions never open a device themselves. They subscribe to the hub, which
//! opens the camera on the first subscriber and releases it when the last one
//! leaves.

mod hub;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use hub::{CameraHub, FrameSubscription, HubConfig, HubStats};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Anything that yields frames in acquisition order.
///
/// `next_frame` blocks until a frame is available. An error means the device
/// is gone; the hub drops the source and does not retry on its own.
pub trait FrameSource: Send {
    /// Human-readable device name for logs.
    fn describe(&self) -> String;

    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Opens the physical camera. Called by the hub each time it needs the device.
pub type SourceOpener = Box<dyn FnMut() -> Result<Box<dyn FrameSource>> + Send>;

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0" or "stub://range").
    pub device: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Open and connect the camera described by `config`.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if config.device.starts_with("stub://") {
        let mut camera = SyntheticCamera::new(config.clone());
        camera.connect()?;
        return Ok(Box::new(camera));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        let mut source = V4l2Source::new(config.clone())?;
        source.connect()?;
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(crate::error::ShotError::device(format!(
            "{} requires the ingest-v4l2 feature",
            config.device
        ))
        .into())
    }
}

/// Opener for the hub that reopens `config` on demand.
pub fn camera_opener(config: CameraConfig) -> SourceOpener {
    Box::new(move || open_camera(&config))
}
