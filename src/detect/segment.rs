//! Frame segmentation: colour filter AND adaptive foreground.

use crate::detect::background::{BackgroundModel, BackgroundParams};
use crate::detect::color::{color_mask, ColorRange};
use crate::frame::{Frame, Mask};

/// Intensity cut applied to the combined mask.
pub const BINARY_CUT: u8 = 50;

/// Turn one frame into a binary marker mask.
///
/// Order matters: colour filter, background update, AND, then binarize.
/// `model` is mutated on every call.
pub fn segment(frame: &Frame, model: &mut BackgroundModel, range: &ColorRange) -> Mask {
    let in_range = color_mask(frame, range);
    let foreground = model.apply(frame);
    let mut combined = foreground.and(&in_range);
    combined.binarize(BINARY_CUT);
    combined
}

/// A colour range bound to its own background model.
pub struct Segmenter {
    model: BackgroundModel,
    range: ColorRange,
}

impl Segmenter {
    pub fn new(range: ColorRange, params: BackgroundParams) -> Self {
        Self {
            model: BackgroundModel::new(params),
            range,
        }
    }

    pub fn segment(&mut self, frame: &Frame) -> Mask {
        segment(frame, &mut self.model, &self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const GREY: [u8; 3] = [96, 96, 96];
    const ORANGE: [u8; 3] = [255, 80, 0];
    const BLUE: [u8; 3] = [20, 40, 220];

    fn warmed_segmenter() -> Result<Segmenter> {
        let mut seg = Segmenter::new(ColorRange::default(), BackgroundParams::default());
        for seq in 0..8 {
            seg.segment(&Frame::solid(40, 30, GREY, seq)?);
        }
        Ok(seg)
    }

    #[test]
    fn moving_marker_is_segmented() -> Result<()> {
        let mut seg = warmed_segmenter()?;
        let mut frame = Frame::solid(40, 30, GREY, 8)?;
        frame.fill_rect(10, 10, 5, 5, ORANGE);
        let mask = seg.segment(&frame);
        assert_eq!(mask.count_on(), 25);
        assert!(mask.is_on(12, 12));
        Ok(())
    }

    #[test]
    fn out_of_range_motion_is_ignored() -> Result<()> {
        let mut seg = warmed_segmenter()?;
        let mut frame = Frame::solid(40, 30, GREY, 8)?;
        frame.fill_rect(10, 10, 5, 5, BLUE);
        assert_eq!(seg.segment(&frame).count_on(), 0);
        Ok(())
    }

    #[test]
    fn static_marker_colour_in_background_is_ignored() -> Result<()> {
        // An orange patch present from the start belongs to the background.
        let mut seg = Segmenter::new(ColorRange::default(), BackgroundParams::default());
        for seq in 0..10 {
            let mut frame = Frame::solid(40, 30, GREY, seq)?;
            frame.fill_rect(0, 0, 6, 6, ORANGE);
            assert_eq!(seg.segment(&frame).count_on(), 0);
        }
        Ok(())
    }
}
