use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::detect::{
    BackgroundParams, ColorRange, DetectorSettings, DEFAULT_MIN_AREA, DEFAULT_VELOCITY_THRESHOLD,
};
use crate::error::ShotError;
use crate::ingest::CameraConfig;
use crate::server::{ServerConfig, SessionOptions};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8082;
const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_HSV_LOWER: [u8; 3] = [5, 106, 70];
const DEFAULT_HSV_UPPER: [u8; 3] = [11, 255, 255];
const DEFAULT_HISTORY: u32 = 500;
const DEFAULT_VAR_THRESHOLD: f32 = 16.0;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_FRAME_POLL_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct ShotdConfigFile {
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    server: Option<ServerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    hsv_lower: Option<[u8; 3]>,
    hsv_upper: Option<[u8; 3]>,
    min_area: Option<u32>,
    velocity_threshold: Option<f64>,
    background_history: Option<u32>,
    var_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    host: Option<String>,
    port: Option<u16>,
    announce_corners: Option<bool>,
    write_timeout_ms: Option<u64>,
    frame_poll_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ShotdConfig {
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Explicit device path; overrides `index` when set.
    pub device: Option<String>,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub hsv_lower: [u8; 3],
    pub hsv_upper: [u8; 3],
    pub min_area: u32,
    pub velocity_threshold: f64,
    pub background_history: u32,
    pub var_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub announce_corners: bool,
    /// Zero disables the timeout.
    pub write_timeout_ms: u64,
    pub frame_poll_ms: u64,
}

impl CameraSettings {
    pub fn device_path(&self) -> String {
        match &self.device {
            Some(device) => device.clone(),
            None => format!("/dev/video{}", self.index),
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.device_path(),
            target_fps: self.target_fps,
            width: self.width,
            height: self.height,
        }
    }
}

impl ShotdConfig {
    /// Load from `SHOTD_CONFIG` (if set) and the environment, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SHOTD_CONFIG").ok();
        let cfg = Self::from_sources(config_path.as_deref().map(Path::new))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// File (if any) plus environment overrides, without validation.
    pub fn from_sources(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ShotdConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: ShotdConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let server = file.server.unwrap_or_default();
        Self {
            camera: CameraSettings {
                index: camera.index.unwrap_or(DEFAULT_CAMERA_INDEX),
                device: camera.device,
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            detection: DetectionSettings {
                hsv_lower: detection.hsv_lower.unwrap_or(DEFAULT_HSV_LOWER),
                hsv_upper: detection.hsv_upper.unwrap_or(DEFAULT_HSV_UPPER),
                min_area: detection.min_area.unwrap_or(DEFAULT_MIN_AREA),
                velocity_threshold: detection
                    .velocity_threshold
                    .unwrap_or(DEFAULT_VELOCITY_THRESHOLD),
                background_history: detection.background_history.unwrap_or(DEFAULT_HISTORY),
                var_threshold: detection.var_threshold.unwrap_or(DEFAULT_VAR_THRESHOLD),
            },
            server: ServerSettings {
                host: server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: server.port.unwrap_or(DEFAULT_PORT),
                announce_corners: server.announce_corners.unwrap_or(true),
                write_timeout_ms: server.write_timeout_ms.unwrap_or(DEFAULT_WRITE_TIMEOUT_MS),
                frame_poll_ms: server.frame_poll_ms.unwrap_or(DEFAULT_FRAME_POLL_MS),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("SHOTD_HOST") {
            if !host.trim().is_empty() {
                self.server.host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("SHOTD_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ShotError::config("SHOTD_PORT must be a port number"))?;
        }
        if let Ok(index) = std::env::var("SHOTD_CAMERA_INDEX") {
            self.camera.index = index
                .trim()
                .parse()
                .map_err(|_| ShotError::config("SHOTD_CAMERA_INDEX must be an integer"))?;
        }
        if let Ok(device) = std::env::var("SHOTD_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = Some(device.trim().to_string());
            }
        }
        if let Ok(lower) = std::env::var("SHOTD_HSV_LOWER") {
            self.detection.hsv_lower = parse_hsv(&lower)?;
        }
        if let Ok(upper) = std::env::var("SHOTD_HSV_UPPER") {
            self.detection.hsv_upper = parse_hsv(&upper)?;
        }
        if let Ok(area) = std::env::var("SHOTD_MIN_AREA") {
            self.detection.min_area = area
                .trim()
                .parse()
                .map_err(|_| ShotError::config("SHOTD_MIN_AREA must be an integer"))?;
        }
        if let Ok(threshold) = std::env::var("SHOTD_VELOCITY_THRESHOLD") {
            self.detection.velocity_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| ShotError::config("SHOTD_VELOCITY_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    /// Reject settings that cannot work. Runs before anything binds or opens.
    pub fn validate(&self) -> Result<()> {
        ColorRange::new(self.detection.hsv_lower, self.detection.hsv_upper)?;

        let threshold = self.detection.velocity_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ShotError::config(format!(
                "velocity threshold must be a finite, non-negative number (got {threshold})"
            ))
            .into());
        }
        if self.detection.min_area == 0 {
            return Err(ShotError::config("minimum blob area must be greater than zero").into());
        }
        if self.detection.background_history == 0 {
            return Err(ShotError::config("background history must be greater than zero").into());
        }
        let var_threshold = self.detection.var_threshold;
        if !var_threshold.is_finite() || var_threshold <= 0.0 {
            return Err(ShotError::config("background var_threshold must be positive").into());
        }

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ShotError::config("camera width and height must be non-zero").into());
        }
        if self.camera.target_fps == 0 {
            return Err(ShotError::config("camera target_fps must be non-zero").into());
        }
        if self.server.frame_poll_ms == 0 {
            return Err(ShotError::config("frame_poll_ms must be non-zero").into());
        }

        if self.server.port == 0 {
            return Err(ShotError::config("listen port must be non-zero").into());
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Resolved listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let target = format!("{}:{}", self.server.host, self.server.port);
        target.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ShotError::config(format!("cannot resolve listen address {target}")).into())
    }

    pub fn detector_settings(&self) -> Result<DetectorSettings> {
        Ok(DetectorSettings {
            color_range: ColorRange::new(self.detection.hsv_lower, self.detection.hsv_upper)?,
            min_area: self.detection.min_area,
            velocity_threshold: self.detection.velocity_threshold,
            background: BackgroundParams {
                history: self.detection.background_history,
                var_threshold: self.detection.var_threshold,
            },
        })
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        let write_timeout = match self.server.write_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Ok(ServerConfig {
            addr: self.listen_addr()?.to_string(),
            detector: self.detector_settings()?,
            session: SessionOptions {
                announce_corners: self.server.announce_corners,
                write_timeout,
                frame_poll: Duration::from_millis(self.server.frame_poll_ms),
            },
        })
    }
}

/// Parse `h,s,v`.
pub fn parse_hsv(value: &str) -> Result<[u8; 3]> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ShotError::config(format!("invalid HSV triple {value:?}")))?;
    <[u8; 3]>::try_from(parts)
        .map_err(|_| ShotError::config(format!("HSV triple needs 3 values: {value:?}")).into())
}

fn read_config_file(path: &Path) -> Result<ShotdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| ShotError::config(format!("invalid config file {}: {}", path.display(), e)))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| ShotError::config(format!("invalid config file {}: {}", path.display(), e)))?
    };
    Ok(cfg)
}
