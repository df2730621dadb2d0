//! shot_listen - print shots streamed by shotd

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;

use shot_tracker::protocol::{parse_line, ServerMessage};
use shot_tracker::Point;

#[derive(Parser, Debug)]
#[command(author, version, about = "Connect to shotd and print each detected shot")]
struct Args {
    /// shotd address.
    #[arg(long, env = "SHOTD_ADDR", default_value = "127.0.0.1:8082")]
    addr: String,

    /// Exit after this many shots.
    #[arg(long)]
    count: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.addr)
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    log::info!("connected to {}", args.addr);

    let mut center: Option<Point> = None;
    let mut shots = 0u64;
    for line in BufReader::new(stream).lines() {
        let line = line.context("connection lost")?;
        if line.is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(ServerMessage::Corners(corners)) => {
                let c = Point::new(corners[2].x / 2, corners[2].y / 2);
                log::info!(
                    "frame {}x{}, center ({}, {})",
                    corners[2].x,
                    corners[2].y,
                    c.x,
                    c.y
                );
                center = Some(c);
            }
            Ok(ServerMessage::Shot(at)) => {
                shots += 1;
                match center {
                    Some(c) => println!(
                        "shot {}: ({}, {}) offset ({:+}, {:+})",
                        shots,
                        at.x,
                        at.y,
                        at.x - c.x,
                        at.y - c.y
                    ),
                    None => println!("shot {}: ({}, {})", shots, at.x, at.y),
                }
                if args.count.is_some_and(|n| shots >= n) {
                    break;
                }
            }
            Err(err) => log::warn!("ignoring line {:?}: {:#}", line, err),
        }
    }

    log::info!("received {} shot(s)", shots);
    Ok(())
}
