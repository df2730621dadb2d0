//! TCP shot-streaming server.
//!
//! A single accept loop hands every connection to its own worker thread.
//! The loop polls a non-blocking listener so it can observe shutdown, and
//! never waits on a session. Stopping the server joins every worker before
//! the camera hub is released.

mod session;

pub use session::{Session, SessionEnd, SessionOptions, SessionStats};

use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::DetectorSettings;
use crate::ingest::{CameraHub, HubStats};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
    pub detector: DetectorSettings,
    pub session: SessionOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8082".to_string(),
            detector: DetectorSettings::default(),
            session: SessionOptions::default(),
        }
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    hub_stats: Arc<HubStats>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn hub_stats(&self) -> Arc<HubStats> {
        self.hub_stats.clone()
    }

    /// Signal shutdown, join every session, then release the camera.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("accept loop thread panicked"))?;
        }
        Ok(())
    }
}

pub struct SessionServer {
    cfg: ServerConfig,
    hub: CameraHub,
}

impl SessionServer {
    pub fn new(cfg: ServerConfig, hub: CameraHub) -> Self {
        Self { cfg, hub }
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.cfg.addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let hub_stats = self.hub.stats();
        let accept_loop = AcceptLoop {
            listener,
            cfg: self.cfg,
            hub: self.hub,
            shutdown: shutdown.clone(),
            workers: Vec::new(),
            next_id: 1,
        };
        let join = std::thread::Builder::new()
            .name("accept-loop".to_string())
            .spawn(move || accept_loop.run())?;

        Ok(ServerHandle {
            addr,
            hub_stats,
            shutdown,
            join: Some(join),
        })
    }
}

struct AcceptLoop {
    listener: TcpListener,
    cfg: ServerConfig,
    hub: CameraHub,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl AcceptLoop {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.workers.retain(|w| !w.is_finished());
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    log::info!("accepted connection from {}", peer);
                    self.start_session(stream);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(err) => {
                    log::warn!("accept failed: {}", err);
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }

        log::info!("stopping {} active session(s)", self.workers.len());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("session worker panicked");
            }
        }
        if let Err(err) = self.hub.stop() {
            log::error!("{}", err);
        }
        log::info!("server stopped");
    }

    fn start_session(&mut self, stream: TcpStream) {
        let id = self.next_id;
        self.next_id += 1;

        let frames = match self.hub.subscribe() {
            Ok(frames) => frames,
            Err(err) => {
                log::warn!("session {} rejected: {}", id, err);
                return;
            }
        };
        let session = match Session::new(
            id,
            stream,
            frames,
            &self.cfg.detector,
            self.cfg.session,
            self.shutdown.clone(),
        ) {
            Ok(session) => session,
            Err(err) => {
                log::warn!("session {} setup failed: {}", id, err);
                return;
            }
        };

        let spawned = std::thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || session::supervise(session));
        match spawned {
            Ok(worker) => self.workers.push(worker),
            Err(err) => log::error!("session {} worker spawn failed: {}", id, err),
        }
    }
}
