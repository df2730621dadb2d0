//! HSV conversion and colour-range filtering.
//!
//! Values follow the 8-bit convention used by common vision toolkits:
//! hue is halved into 0..=179, saturation and value span 0..=255.

use serde::{Deserialize, Serialize};

use crate::error::ShotError;
use crate::frame::{Frame, Mask, MASK_ON};

/// Largest representable hue.
pub const MAX_HUE: u8 = 179;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let [r, g, b] = rgb.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max > 0.0 {
        (diff * 255.0 / max).round() as u8
    } else {
        0
    };

    let mut hue = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    // 359.x degrees rounds up to 180, which wraps back to red.
    let h = match (hue / 2.0).round() as u8 {
        h if h > MAX_HUE => 0,
        h => h,
    };

    Hsv { h, s, v: max as u8 }
}

/// Inclusive lower/upper HSV bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Result<Self, ShotError> {
        if lower[0] > MAX_HUE || upper[0] > MAX_HUE {
            return Err(ShotError::config(format!(
                "hue bounds must be within 0..={MAX_HUE}"
            )));
        }
        for (channel, (lo, hi)) in ["hue", "saturation", "value"]
            .iter()
            .zip(lower.iter().zip(upper.iter()))
        {
            if lo > hi {
                return Err(ShotError::config(format!(
                    "{channel} lower bound {lo} exceeds upper bound {hi}"
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        let px = [hsv.h, hsv.s, hsv.v];
        px.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }
}

impl Default for ColorRange {
    /// Orange marker range.
    fn default() -> Self {
        Self {
            lower: [5, 106, 70],
            upper: [11, 255, 255],
        }
    }
}

/// Mask of pixels whose HSV value lies inside `range`.
pub fn color_mask(frame: &Frame, range: &ColorRange) -> Mask {
    let mut mask = Mask::new(frame.width, frame.height);
    for (out, px) in mask
        .values_mut()
        .iter_mut()
        .zip(frame.pixels().chunks_exact(3))
    {
        if range.contains(rgb_to_hsv([px[0], px[1], px[2]])) {
            *out = MASK_ON;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_hues() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(rgb_to_hsv([0, 255, 0]).h, 60);
        assert_eq!(rgb_to_hsv([0, 0, 255]).h, 120);
    }

    #[test]
    fn grey_has_no_saturation() {
        let hsv = rgb_to_hsv([96, 96, 96]);
        assert_eq!(hsv.s, 0);
        assert_eq!(hsv.h, 0);
        assert_eq!(hsv.v, 96);
    }

    #[test]
    fn orange_marker_is_in_default_range() {
        let hsv = rgb_to_hsv([255, 80, 0]);
        assert_eq!(hsv.h, 9);
        assert!(ColorRange::default().contains(hsv));
        assert!(!ColorRange::default().contains(rgb_to_hsv([96, 96, 96])));
    }

    #[test]
    fn range_bounds_are_inclusive() -> Result<(), ShotError> {
        let range = ColorRange::new([9, 255, 255], [9, 255, 255])?;
        assert!(range.contains(Hsv { h: 9, s: 255, v: 255 }));
        assert!(!range.contains(Hsv { h: 10, s: 255, v: 255 }));
        Ok(())
    }

    #[test]
    fn range_rejects_inverted_or_out_of_scale_bounds() {
        assert!(ColorRange::new([12, 0, 0], [11, 255, 255]).is_err());
        assert!(ColorRange::new([0, 0, 0], [180, 255, 255]).is_err());
    }

    #[test]
    fn near_wraparound_hue_stays_in_scale() {
        // Red with a hint of blue lands just below 360 degrees.
        let hsv = rgb_to_hsv([255, 0, 1]);
        assert!(hsv.h <= MAX_HUE);
    }
}
