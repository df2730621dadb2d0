//! Shot Tracker
//!
//! Watches a camera for a small colored marker, tracks its centroid from
//! frame to frame, and reports a "shot" whenever the marker's motion changes
//! abruptly. Shots are streamed to TCP clients as `x,y` lines.
//!
//! # Architecture
//!
//! ```text
//! camera ─► CameraHub ─┬─► Session ─► Segmenter ─► Blob ─► Tracker ─► Trigger ─► socket
//!                      └─► Session ─► ...
//! ```
//!
//! One hub thread owns the physical device and fans frames out to every
//! connected session. Each session keeps its own background model and motion
//! history, so clients never see each other's state.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames, binary masks, pixel coordinates
//! - `detect`: segmentation, blob extraction, motion tracking, event trigger
//! - `ingest`: camera sources and the shared `CameraHub`
//! - `server`: TCP accept loop and per-client sessions
//! - `protocol`: the `x,y` / `CORNERS:` line format
//! - `config`: file + environment configuration for `shotd`

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod protocol;
pub mod server;

pub use config::ShotdConfig;
pub use detect::{DetectorSettings, ShotDetector, ShotEvent};
pub use error::ShotError;
pub use frame::{Frame, Mask, Point};
pub use ingest::{camera_opener, CameraConfig, CameraHub, FrameSource, HubConfig};
pub use server::{ServerConfig, ServerHandle, SessionServer};
