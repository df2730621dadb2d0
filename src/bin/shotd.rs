//! shotd - shot detection daemon
//!
//! This daemon:
//! 1. Loads configuration (file, environment, then flags)
//! 2. Starts the camera hub (the device opens when the first client connects)
//! 3. Streams detected shots to every TCP client as `x,y` lines

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use shot_tracker::{
    camera_opener,
    config::{parse_hsv, ShotdConfig},
    CameraHub, HubConfig, SessionServer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect marker shots on a camera and stream them over TCP")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "SHOTD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host.
    #[arg(long)]
    host: Option<String>,

    /// Listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Camera index (maps to /dev/video<N>).
    #[arg(long)]
    camera_index: Option<u32>,

    /// Camera device path; overrides --camera-index. Use stub://<name> for
    /// the synthetic camera.
    #[arg(long)]
    camera_device: Option<String>,

    /// Velocity-delta threshold; a shot fires when the delta is strictly greater.
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum blob area in pixels.
    #[arg(long)]
    min_area: Option<u32>,

    /// Lower HSV bound as h,s,v.
    #[arg(long, value_name = "H,S,V")]
    hsv_lower: Option<String>,

    /// Upper HSV bound as h,s,v.
    #[arg(long, value_name = "H,S,V")]
    hsv_upper: Option<String>,

    /// Do not send the CORNERS line to new clients.
    #[arg(long)]
    no_corners: bool,
}

impl Args {
    fn apply(&self, cfg: &mut ShotdConfig) -> Result<()> {
        if let Some(host) = &self.host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(index) = self.camera_index {
            cfg.camera.index = index;
        }
        if let Some(device) = &self.camera_device {
            cfg.camera.device = Some(device.clone());
        }
        if let Some(threshold) = self.threshold {
            cfg.detection.velocity_threshold = threshold;
        }
        if let Some(min_area) = self.min_area {
            cfg.detection.min_area = min_area;
        }
        if let Some(lower) = &self.hsv_lower {
            cfg.detection.hsv_lower = parse_hsv(lower)?;
        }
        if let Some(upper) = &self.hsv_upper {
            cfg.detection.hsv_upper = parse_hsv(upper)?;
        }
        if self.no_corners {
            cfg.server.announce_corners = false;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = ShotdConfig::from_sources(args.config.as_deref())?;
    args.apply(&mut cfg)?;
    cfg.validate()?;

    let server_config = cfg.server_config()?;
    log::info!(
        "detector: hsv {:?}..{:?}, min area {}, threshold {}",
        cfg.detection.hsv_lower,
        cfg.detection.hsv_upper,
        cfg.detection.min_area,
        cfg.detection.velocity_threshold
    );

    let camera = cfg.camera.camera_config();
    log::info!("camera device {} ({} fps requested)", camera.device, camera.target_fps);
    let hub = CameraHub::spawn(camera_opener(camera), HubConfig::default())?;

    let handle = SessionServer::new(server_config, hub).spawn()?;
    log::info!("shotd listening on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {e}"))?;

    log::info!("shotd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping server...");
    handle.stop()?;

    Ok(())
}
