//! One client connection's pipeline.
//!
//! Lifecycle: Accepted → Streaming → Closed. The session owns its frame
//! subscription, detector state and socket; all three are released when
//! `run` returns, whatever the reason.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::{DetectorSettings, ShotDetector};
use crate::error::ShotError;
use crate::ingest::FrameSubscription;
use crate::protocol;

/// Why a session stopped streaming without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    Shutdown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    /// Frames the hub delivered while this session was still busy.
    pub frames_skipped: u64,
    pub events_sent: u64,
    /// Oldest frame, measured from capture to the start of processing.
    pub max_frame_age: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub announce_corners: bool,
    pub write_timeout: Option<Duration>,
    pub frame_poll: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            announce_corners: true,
            write_timeout: Some(Duration::from_secs(5)),
            frame_poll: Duration::from_millis(100),
        }
    }
}

pub struct Session {
    id: u64,
    link: ClientLink,
    frames: FrameSubscription,
    detector: ShotDetector,
    options: SessionOptions,
    shutdown: Arc<AtomicBool>,
    stats: SessionStats,
    corners_sent: bool,
    last_sequence: Option<u64>,
}

impl Session {
    pub fn new(
        id: u64,
        stream: TcpStream,
        frames: FrameSubscription,
        detector: &DetectorSettings,
        options: SessionOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ShotError> {
        Ok(Self {
            id,
            link: ClientLink::new(stream, options.write_timeout)?,
            frames,
            detector: ShotDetector::new(detector),
            options,
            shutdown,
            stats: SessionStats::default(),
            corners_sent: false,
            last_sequence: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.link.peer
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Stream shots until the client leaves, shutdown is requested, or an
    /// error ends the session.
    pub fn run(&mut self) -> Result<SessionEnd, ShotError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(SessionEnd::Shutdown);
            }
            if self.link.peer_closed()? {
                return Ok(SessionEnd::ClientClosed);
            }

            let frame = match self.frames.next_frame(self.options.frame_poll) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(_) if self.shutdown.load(Ordering::SeqCst) => {
                    return Ok(SessionEnd::Shutdown);
                }
                Err(err) => return Err(err),
            };
            self.note_sequence(frame.sequence);
            self.stats.max_frame_age = self.stats.max_frame_age.max(frame.age());

            if self.options.announce_corners && !self.corners_sent {
                self.link
                    .send_line(&protocol::encode_corners(frame.width, frame.height))?;
                self.corners_sent = true;
                log::debug!(
                    "session {}: corners sent ({}x{})",
                    self.id,
                    frame.width,
                    frame.height
                );
            }

            let analysis = self.detector.process(&frame);
            drop(frame);
            self.stats.frames_processed += 1;

            if let Some(event) = analysis.event {
                self.link.send_line(&protocol::encode_event(&event))?;
                self.stats.events_sent += 1;
                log::info!(
                    "session {}: shot at ({}, {}) delta={:.2}",
                    self.id,
                    event.x,
                    event.y,
                    event.observed_velocity_delta
                );
            }
        }
    }

    fn note_sequence(&mut self, sequence: u64) {
        if let Some(last) = self.last_sequence {
            self.stats.frames_skipped += sequence.saturating_sub(last + 1);
        }
        self.last_sequence = Some(sequence);
    }
}

/// Run `session` to completion and log how it ended.
pub(crate) fn supervise(mut session: Session) {
    let id = session.id();
    let peer = session.peer();
    let outcome = session.run();
    let stats = session.stats();
    drop(session);

    match outcome {
        Ok(SessionEnd::ClientClosed) => {
            log::info!("session {} ({}): client disconnected", id, peer)
        }
        Ok(SessionEnd::Shutdown) => log::info!("session {} ({}): shut down", id, peer),
        Err(err) => log::warn!("session {} ({}) closed: {}", id, peer, err),
    }
    log::info!(
        "session {}: frames={} skipped={} shots={} max_frame_age={:?}",
        id,
        stats.frames_processed,
        stats.frames_skipped,
        stats.events_sent,
        stats.max_frame_age
    );
}

struct ClientLink {
    stream: TcpStream,
    peer: SocketAddr,
    scratch: [u8; 256],
}

impl ClientLink {
    fn new(stream: TcpStream, write_timeout: Option<Duration>) -> std::io::Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(write_timeout)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer,
            scratch: [0; 256],
        })
    }

    fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream.write_all(line.as_bytes())
    }

    /// Non-blocking EOF check. Inbound bytes carry no meaning and are discarded.
    fn peer_closed(&mut self) -> std::io::Result<bool> {
        self.stream.set_nonblocking(true)?;
        let read = self.stream.read(&mut self.scratch);
        self.stream.set_nonblocking(false)?;
        match read {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(err) => match err.kind() {
                ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(false),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => Ok(true),
                _ => Err(err),
            },
        }
    }
}
