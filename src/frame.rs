//! Frame and mask containers.
//!
//! - `Frame`: one captured RGB image plus its acquisition order.
//! - `Mask`: single-channel 0/255 image produced by segmentation.
//! - `Point`: integer pixel coordinate.
//!
//! Frames are produced by a `FrameSource`, shared read-only with every
//! session pipeline for one pass, then dropped. Nothing retains a frame
//! across iterations.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

/// Value written into a mask for "on" pixels.
pub const MASK_ON: u8 = 255;

// ----------------------------------------------------------------------------
// Point
// ----------------------------------------------------------------------------

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Captured RGB24 frame, row-major, 3 bytes per pixel.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Acquisition order as assigned by the source.
    pub sequence: u64,

    captured_at: Instant,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the length does not match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let data = rgb.iter().copied().cycle().take(len).collect();
        Self::from_rgb(data, width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGB triple at (x, y). Caller must stay in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Paint an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, rgb: [u8; 3]) {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (x + width as i32).clamp(0, self.width as i32) as u32;
        let y1 = (y + height as i32).clamp(0, self.height as i32) as u32;
        for row in y0..y1 {
            for col in x0..x1 {
                let offset = (row as usize * self.width as usize + col as usize) * 3;
                self.data[offset..offset + 3].copy_from_slice(&rgb);
            }
        }
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn center(&self) -> Point {
        Point::new((self.width / 2) as i32, (self.height / 2) as i32)
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// Mask
// ----------------------------------------------------------------------------

/// Single-channel mask, one byte per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// All-off mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Build a mask from rows of text: `#` is on, anything else off.
    ///
    /// Handy for describing small regions in tests.
    pub fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
        let mut mask = Self::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    mask.set(x as u32, y as u32, MASK_ON);
                }
            }
        }
        mask
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn is_on(&self, x: u32, y: u32) -> bool {
        self.get(x, y) != 0
    }

    pub fn values(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn values_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel-wise AND. Both masks come from the same frame, so sizes agree.
    pub fn and(&self, other: &Mask) -> Mask {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a & b)
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Pixels at or above `cut` become `MASK_ON`, the rest zero.
    pub fn binarize(&mut self, cut: u8) {
        for value in &mut self.data {
            *value = if *value >= cut { MASK_ON } else { 0 };
        }
    }

    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
