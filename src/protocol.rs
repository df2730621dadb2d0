//! Line protocol, server to client only.
//!
//! ```text
//! CORNERS:0,0,W,0,W,H,0,H\n   once per connection, before any shot
//! x,y\n                       one per detected shot
//! ```

use anyhow::{anyhow, Context, Result};

use crate::detect::ShotEvent;
use crate::frame::Point;

pub const CORNERS_PREFIX: &str = "CORNERS:";

/// Frame corners: top-left, top-right, bottom-right, bottom-left.
pub fn frame_corners(width: u32, height: u32) -> [Point; 4] {
    let (w, h) = (width as i32, height as i32);
    [
        Point::new(0, 0),
        Point::new(w, 0),
        Point::new(w, h),
        Point::new(0, h),
    ]
}

pub fn encode_corners(width: u32, height: u32) -> String {
    let coords = frame_corners(width, height)
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(",");
    format!("{CORNERS_PREFIX}{coords}\n")
}

pub fn encode_event(event: &ShotEvent) -> String {
    format!("{},{}\n", event.x, event.y)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    Corners([Point; 4]),
    Shot(Point),
}

/// Parse one line (with or without its trailing newline).
pub fn parse_line(line: &str) -> Result<ServerMessage> {
    let line = line.trim_end_matches(['\n', '\r']);
    if let Some(rest) = line.strip_prefix(CORNERS_PREFIX) {
        let values = parse_ints(rest)?;
        if values.len() != 8 {
            return Err(anyhow!("corners need 8 values, got {}", values.len()));
        }
        let mut corners = [Point::new(0, 0); 4];
        for (corner, pair) in corners.iter_mut().zip(values.chunks_exact(2)) {
            *corner = Point::new(pair[0], pair[1]);
        }
        return Ok(ServerMessage::Corners(corners));
    }

    match parse_ints(line)?.as_slice() {
        [x, y] => Ok(ServerMessage::Shot(Point::new(*x, *y))),
        other => Err(anyhow!("shot needs 2 values, got {}", other.len())),
    }
}

fn parse_ints(text: &str) -> Result<Vec<i32>> {
    text.split(',')
        .map(|v| {
            v.trim()
                .parse::<i32>()
                .with_context(|| format!("invalid coordinate {v:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_follow_frame_size() {
        assert_eq!(encode_corners(640, 480), "CORNERS:0,0,640,0,640,480,0,480\n");
    }

    #[test]
    fn event_line_parses_back_to_coordinates() -> Result<()> {
        for (x, y) in [(150, 100), (0, 0), (639, 479), (-3, 7)] {
            let event = ShotEvent {
                x,
                y,
                observed_velocity_delta: 12.0,
            };
            let line = encode_event(&event);
            assert!(line.ends_with('\n'));
            assert_eq!(parse_line(&line)?, ServerMessage::Shot(Point::new(x, y)));
        }
        Ok(())
    }

    #[test]
    fn corners_line_parses() -> Result<()> {
        let parsed = parse_line(&encode_corners(320, 240))?;
        assert_eq!(parsed, ServerMessage::Corners(frame_corners(320, 240)));
        Ok(())
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_line("1,2,3\n").is_err());
        assert!(parse_line("CORNERS:1,2\n").is_err());
        assert!(parse_line("x,y\n").is_err());
    }
}
