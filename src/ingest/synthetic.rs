//! Synthetic camera for `stub://` devices.
//!
//! Renders a noisy grey scene with an orange marker that repeatedly glides
//! across the frame at constant speed and then stops dead, which is exactly
//! the speed profile the detector treats as an impact.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use super::{CameraConfig, FrameSource};
use crate::frame::Frame;

const BACKGROUND: u8 = 96;
const NOISE: i16 = 2;
const MARKER: [u8; 3] = [255, 80, 0];

/// Frames per glide-and-stop cycle.
const CYCLE: u64 = 60;
const GLIDE_START: u64 = 20;
const GLIDE_END: u64 = 40;
const HOLD_END: u64 = 50;

pub struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    rng: StdRng,
    last_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        let seed = config.device.bytes().fold(0u64, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u64)
        });
        Self {
            config,
            frame_count: 0,
            rng: StdRng::seed_from_u64(seed),
            last_frame_at: None,
        }
    }

    /// Synthetic sources are always "connected".
    pub fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticCamera: connected to {} ({}x{} @ {} fps)",
            self.config.device,
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    /// Marker top-left for the given frame index, if visible.
    fn marker_origin(&self, index: u64) -> Option<(i32, i32)> {
        let w = self.config.width as i64;
        let h = self.config.height as i64;
        let side = self.marker_side() as i64;
        let phase = index % CYCLE;
        let start = w / 8;
        let speed = (w / 40).max(1);

        let cx = match phase {
            p if p < GLIDE_START => return None,
            p if p < GLIDE_END => start + (p - GLIDE_START) as i64 * speed,
            p if p < HOLD_END => start + (GLIDE_END - 1 - GLIDE_START) as i64 * speed,
            _ => return None,
        };
        let cy = h / 2;
        Some(((cx - side / 2) as i32, (cy - side / 2) as i32))
    }

    fn marker_side(&self) -> u32 {
        (self.config.width / 32).max(12)
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let period = Duration::from_secs(1) / self.config.target_fps;
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn render(&mut self, index: u64) -> Result<Frame> {
        let len = self.config.width as usize * self.config.height as usize * 3;
        let mut pixels = Vec::with_capacity(len);
        for _ in 0..len {
            let noise = self.rng.gen_range(-NOISE..=NOISE);
            pixels.push((BACKGROUND as i16 + noise) as u8);
        }
        let mut frame = Frame::from_rgb(pixels, self.config.width, self.config.height, index)?;
        if let Some((x, y)) = self.marker_origin(index) {
            let side = self.marker_side();
            frame.fill_rect(x, y, side, side, MARKER);
        }
        Ok(frame)
    }
}

impl FrameSource for SyntheticCamera {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.pace();
        let index = self.frame_count;
        self.frame_count += 1;
        self.render(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorSettings, ShotDetector};

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 0,
            width: 320,
            height: 240,
        }
    }

    #[test]
    fn synthetic_camera_produces_frames() -> Result<()> {
        let mut camera = SyntheticCamera::new(stub_config());
        camera.connect()?;
        let first = camera.next_frame()?;
        let second = camera.next_frame()?;
        assert_eq!((first.width, first.height), (320, 240));
        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert_eq!(camera.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn marker_glides_then_holds() {
        let camera = SyntheticCamera::new(stub_config());
        assert_eq!(camera.marker_origin(0), None);
        let a = camera.marker_origin(GLIDE_START).expect("visible");
        let b = camera.marker_origin(GLIDE_START + 1).expect("visible");
        assert_eq!(b.0 - a.0, 8);
        assert_eq!(
            camera.marker_origin(GLIDE_END - 1),
            camera.marker_origin(HOLD_END - 1)
        );
        assert_eq!(camera.marker_origin(HOLD_END), None);
    }

    #[test]
    fn stop_after_glide_triggers_detector() -> Result<()> {
        let mut camera = SyntheticCamera::new(stub_config());
        let mut detector = ShotDetector::new(&DetectorSettings {
            velocity_threshold: 4.0,
            ..DetectorSettings::default()
        });

        let mut events = Vec::new();
        for _ in 0..CYCLE {
            let frame = camera.next_frame()?;
            events.extend(detector.process(&frame).event);
        }

        assert_eq!(events.len(), 1);
        let origin = camera.marker_origin(GLIDE_END).expect("holding");
        let side = camera.marker_side() as i32;
        assert_eq!(events[0].x, origin.0 + side / 2);
        assert_eq!(events[0].y, origin.1 + side / 2);
        Ok(())
    }
}
