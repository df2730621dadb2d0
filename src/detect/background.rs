//! Adaptive background model.
//!
//! Each pixel keeps a running Gaussian: a per-channel mean and one shared
//! variance. A pixel is foreground when its squared colour distance from the
//! mean exceeds `var_threshold` variances. The mean follows every frame with
//! learning rate `max(1/(n+1), 1/history)`; the variance is only relearned on
//! pixels that matched the background, so a marker passing through does not
//! widen the model around itself.

use crate::frame::{Frame, Mask, MASK_ON};

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackgroundParams {
    /// Number of frames the model effectively remembers.
    pub history: u32,
    /// Squared-distance cut, in variances.
    pub var_threshold: f32,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
        }
    }
}

/// Per-pixel statistical background. Owned by exactly one segmenter.
pub struct BackgroundModel {
    params: BackgroundParams,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u64,
}

impl BackgroundModel {
    pub fn new(params: BackgroundParams) -> Self {
        Self {
            params,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Current learning rate.
    fn learning_rate(&self) -> f32 {
        let bootstrap = 1.0 / (self.frames_seen + 1) as f32;
        let floor = 1.0 / self.params.history.max(1) as f32;
        bootstrap.max(floor)
    }

    /// Update the model with `frame` and return the foreground mask.
    ///
    /// The first frame (or the first after a resolution change) seeds the
    /// model and reports no foreground.
    pub fn apply(&mut self, frame: &Frame) -> Mask {
        let mut foreground = Mask::new(frame.width, frame.height);

        if self.frames_seen == 0 || (frame.width, frame.height) != (self.width, self.height) {
            if self.frames_seen > 0 {
                log::debug!(
                    "background model reset: {}x{} -> {}x{}",
                    self.width,
                    self.height,
                    frame.width,
                    frame.height
                );
            }
            self.width = frame.width;
            self.height = frame.height;
            self.mean = frame.pixels().iter().map(|&c| c as f32).collect();
            self.variance = vec![VAR_INIT; frame.pixel_count()];
            self.frames_seen = 1;
            return foreground;
        }

        let alpha = self.learning_rate();
        let cut = self.params.var_threshold;

        for (i, (px, out)) in frame
            .pixels()
            .chunks_exact(3)
            .zip(foreground.values_mut().iter_mut())
            .enumerate()
        {
            let mean = &mut self.mean[i * 3..i * 3 + 3];
            let mut d2 = 0.0f32;
            let mut diff = [0.0f32; 3];
            for c in 0..3 {
                diff[c] = px[c] as f32 - mean[c];
                d2 += diff[c] * diff[c];
            }

            let var = &mut self.variance[i];
            let is_foreground = d2 > cut * *var;
            if is_foreground {
                *out = MASK_ON;
            } else {
                *var = (*var + alpha * (d2 / 3.0 - *var)).clamp(VAR_MIN, VAR_MAX);
            }
            for c in 0..3 {
                mean[c] += alpha * diff[c];
            }
        }

        self.frames_seen += 1;
        foreground
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn grey(seq: u64) -> Result<Frame> {
        Frame::solid(32, 24, [96, 96, 96], seq)
    }

    #[test]
    fn first_frame_seeds_without_foreground() -> Result<()> {
        let mut model = BackgroundModel::new(BackgroundParams::default());
        let mask = model.apply(&grey(0)?);
        assert_eq!(mask.count_on(), 0);
        assert_eq!(model.frames_seen(), 1);
        Ok(())
    }

    #[test]
    fn static_scene_stays_background() -> Result<()> {
        let mut model = BackgroundModel::new(BackgroundParams::default());
        for seq in 0..20 {
            let mask = model.apply(&grey(seq)?);
            assert_eq!(mask.count_on(), 0);
        }
        Ok(())
    }

    #[test]
    fn new_object_is_foreground() -> Result<()> {
        let mut model = BackgroundModel::new(BackgroundParams::default());
        for seq in 0..10 {
            model.apply(&grey(seq)?);
        }
        let mut frame = grey(10)?;
        frame.fill_rect(4, 4, 6, 5, [255, 80, 0]);
        let mask = model.apply(&frame);
        assert_eq!(mask.count_on(), 30);
        assert!(mask.is_on(4, 4));
        assert!(!mask.is_on(0, 0));
        Ok(())
    }

    #[test]
    fn lingering_object_is_not_absorbed_quickly() -> Result<()> {
        let mut model = BackgroundModel::new(BackgroundParams::default());
        for seq in 0..30 {
            model.apply(&grey(seq)?);
        }
        for seq in 30..45 {
            let mut frame = grey(seq)?;
            frame.fill_rect(8, 8, 4, 4, [255, 80, 0]);
            let mask = model.apply(&frame);
            assert!(mask.is_on(9, 9), "absorbed after {} frames", seq - 30);
        }
        Ok(())
    }

    #[test]
    fn resolution_change_reseeds() -> Result<()> {
        let mut model = BackgroundModel::new(BackgroundParams::default());
        model.apply(&grey(0)?);
        model.apply(&grey(1)?);
        let mask = model.apply(&Frame::solid(8, 8, [255, 255, 255], 2)?);
        assert_eq!(mask.count_on(), 0);
        assert_eq!(model.frames_seen(), 1);
        Ok(())
    }
}
