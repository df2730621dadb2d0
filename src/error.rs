//! Typed failure taxonomy.
//!
//! Plumbing code uses `anyhow`; the variants here are the failures a
//! supervisor has to tell apart (a lost camera, a broken client, a bad config).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShotError {
    /// The camera failed to open, a frame read failed, or the feed closed.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Write, read or accept failure on a client connection.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Invalid settings. Raised before the listener binds.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl ShotError {
    pub fn config(msg: impl Into<String>) -> Self {
        ShotError::Configuration(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        ShotError::DeviceUnavailable(msg.into())
    }
}
