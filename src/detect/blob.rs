//! Connected-region extraction on binary masks.

use crate::frame::{Mask, Point};

/// Default minimum region size, in mask pixels.
pub const DEFAULT_MIN_AREA: u32 = 100;

/// One connected region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Blob {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Number of "on" pixels in the region.
    pub area: u32,
}

impl Blob {
    /// Bounding-box centre, truncated.
    pub fn centroid(&self) -> Point {
        Point::new(
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }

    pub fn bbox_area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// All 8-connected regions of `mask`, in raster discovery order.
pub fn connected_regions(mask: &Mask) -> Vec<Blob> {
    let (w, h) = (mask.width, mask.height);
    let mut visited = vec![false; w as usize * h as usize];
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut regions = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || !mask.is_on(x, y) {
                continue;
            }
            visited[idx] = true;
            stack.push((x, y));

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
            let mut area = 0u32;

            while let Some((cx, cy)) = stack.pop() {
                area += 1;
                min_x = min_x.min(cx);
                min_y = min_y.min(cy);
                max_x = max_x.max(cx);
                max_y = max_y.max(cy);

                for ny in cy.saturating_sub(1)..=(cy + 1).min(h - 1) {
                    for nx in cx.saturating_sub(1)..=(cx + 1).min(w - 1) {
                        let nidx = (ny * w + nx) as usize;
                        if !visited[nidx] && mask.is_on(nx, ny) {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            regions.push(Blob {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
                area,
            });
        }
    }

    regions
}

/// Pick the single marker candidate for this frame.
///
/// Regions smaller than `min_area` are dropped; of the rest, the largest
/// bounding box wins and the earliest region in raster order wins ties.
pub fn extract(mask: &Mask, min_area: u32) -> Option<Blob> {
    let mut best: Option<Blob> = None;
    for blob in connected_regions(mask)
        .into_iter()
        .filter(|b| b.area >= min_area)
    {
        if best.map_or(true, |b| blob.bbox_area() > b.bbox_area()) {
            best = Some(blob);
        }
    }
    best
}
