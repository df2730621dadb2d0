//! Camera fan-out.
//!
//! The hub thread is the only code that touches the physical camera. Each
//! session holds a `FrameSubscription` backed by a one-slot channel; a session
//! that has not consumed its previous frame skips the next one instead of
//! stalling the hub or its siblings.
//!
//! Device lifecycle:
//! - opened when the first subscriber arrives
//! - released when the last subscriber is gone, on read failure, or on stop
//! - a failed open or read disconnects every current subscriber; the next
//!   subscriber triggers a fresh open

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceOpener};
use crate::error::ShotError;
use crate::frame::Frame;

#[derive(Clone, Copy, Debug)]
pub struct HubConfig {
    /// How long the idle hub waits for a subscriber before rechecking shutdown.
    pub idle_poll: Duration,
    /// Interval between health log lines while streaming.
    pub health_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_millis(100),
            health_interval: Duration::from_secs(5),
        }
    }
}

/// Live counters, readable from any thread.
#[derive(Debug, Default)]
pub struct HubStats {
    subscribers: AtomicUsize,
    device_open: AtomicBool,
    device_opens: AtomicU64,
    frames_captured: AtomicU64,
}

impl HubStats {
    pub fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    pub fn device_open(&self) -> bool {
        self.device_open.load(Ordering::SeqCst)
    }

    /// Number of times the camera has been opened.
    pub fn device_opens(&self) -> u64 {
        self.device_opens.load(Ordering::SeqCst)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::SeqCst)
    }
}

enum HubCommand {
    Subscribe(SyncSender<Arc<Frame>>),
}

/// One session's view of the camera. Dropping it unsubscribes.
pub struct FrameSubscription {
    frames: Receiver<Arc<Frame>>,
}

impl FrameSubscription {
    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` on timeout; `DeviceUnavailable` once the hub has dropped
    /// this subscriber (camera failure or hub stopped).
    pub fn next_frame(&self, timeout: Duration) -> Result<Option<Arc<Frame>>, ShotError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ShotError::device("camera feed closed"))
            }
        }
    }
}

pub struct CameraHub {
    commands: Sender<HubCommand>,
    stats: Arc<HubStats>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CameraHub {
    pub fn spawn(opener: SourceOpener, config: HubConfig) -> Result<Self> {
        let (commands, rx) = mpsc::channel();
        let stats = Arc::new(HubStats::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = HubWorker {
            opener,
            config,
            commands: rx,
            stats: stats.clone(),
            shutdown: shutdown.clone(),
            device: None,
            subscribers: Vec::new(),
            reported_geometry: false,
        };
        let join = std::thread::Builder::new()
            .name("camera-hub".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            commands,
            stats,
            shutdown,
            join: Some(join),
        })
    }

    /// Register a new frame consumer.
    pub fn subscribe(&self) -> Result<FrameSubscription, ShotError> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.commands
            .send(HubCommand::Subscribe(tx))
            .map_err(|_| ShotError::device("camera hub stopped"))?;
        Ok(FrameSubscription { frames: rx })
    }

    pub fn stats(&self) -> Arc<HubStats> {
        self.stats.clone()
    }

    /// Stop the hub thread and release the camera.
    pub fn stop(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("camera hub thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for CameraHub {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_join() {
            log::error!("{}", err);
        }
    }
}

struct HubWorker {
    opener: SourceOpener,
    config: HubConfig,
    commands: Receiver<HubCommand>,
    stats: Arc<HubStats>,
    shutdown: Arc<AtomicBool>,
    device: Option<Box<dyn FrameSource>>,
    subscribers: Vec<SyncSender<Arc<Frame>>>,
    reported_geometry: bool,
}

impl HubWorker {
    fn run(mut self) {
        let mut last_health_log = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            if !self.drain_commands() {
                break;
            }

            if self.subscribers.is_empty() {
                self.release_device("no subscribers");
                match self.commands.recv_timeout(self.config.idle_poll) {
                    Ok(cmd) => self.handle(cmd),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            }

            if self.device.is_none() && !self.open_device() {
                continue;
            }
            self.broadcast_next();

            if last_health_log.elapsed() >= self.config.health_interval {
                if let Some(device) = self.device.as_ref() {
                    log::info!(
                        "camera health={} frames={} subscribers={} device={}",
                        device.is_healthy(),
                        self.stats.frames_captured(),
                        self.subscribers.len(),
                        device.describe()
                    );
                }
                last_health_log = Instant::now();
            }
        }

        self.subscribers.clear();
        self.publish_subscribers();
        self.release_device("hub stopped");
    }

    /// Returns false once every `CameraHub` handle is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => self.handle(cmd),
                Err(mpsc::TryRecvError::Empty) => return true,
                Err(mpsc::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Subscribe(tx) => {
                self.subscribers.push(tx);
                self.publish_subscribers();
            }
        }
    }

    fn open_device(&mut self) -> bool {
        match (self.opener)() {
            Ok(device) => {
                log::info!("camera opened: {}", device.describe());
                self.device = Some(device);
                self.stats.device_opens.fetch_add(1, Ordering::SeqCst);
                self.stats.device_open.store(true, Ordering::SeqCst);
                true
            }
            Err(err) => {
                log::warn!(
                    "camera unavailable: {:#}; closing {} session(s)",
                    err,
                    self.subscribers.len()
                );
                self.subscribers.clear();
                self.publish_subscribers();
                false
            }
        }
    }

    fn broadcast_next(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        let frame = match device.next_frame() {
            Ok(frame) => Arc::new(frame),
            Err(err) => {
                log::warn!(
                    "camera read failed: {:#}; closing {} session(s)",
                    err,
                    self.subscribers.len()
                );
                self.subscribers.clear();
                self.publish_subscribers();
                self.release_device("read failure");
                return;
            }
        };
        self.stats.frames_captured.fetch_add(1, Ordering::SeqCst);

        if !self.reported_geometry {
            let center = frame.center();
            log::info!(
                "frame size {}x{}, center ({}, {})",
                frame.width,
                frame.height,
                center.x,
                center.y
            );
            self.reported_geometry = true;
        }

        self.subscribers.retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        self.publish_subscribers();
    }

    fn release_device(&mut self, reason: &str) {
        if let Some(device) = self.device.take() {
            log::info!("camera released ({}): {}", reason, device.describe());
            drop(device);
            self.stats.device_open.store(false, Ordering::SeqCst);
        }
    }

    fn publish_subscribers(&self) {
        self.stats
            .subscribers
            .store(self.subscribers.len(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts live instances so tests can see when the device is released.
    struct CountingSource {
        live: Arc<AtomicUsize>,
        seq: u64,
        fail_after: Option<u64>,
    }

    impl Drop for CountingSource {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FrameSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        fn next_frame(&mut self) -> Result<Frame> {
            if self.fail_after.is_some_and(|n| self.seq >= n) {
                return Err(anyhow!("device unplugged"));
            }
            std::thread::sleep(Duration::from_millis(2));
            self.seq += 1;
            Frame::solid(4, 4, [0, 0, 0], self.seq)
        }
    }

    fn counting_opener(live: Arc<AtomicUsize>, fail_after: Option<u64>) -> SourceOpener {
        Box::new(move || {
            live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSource {
                live: live.clone(),
                seq: 0,
                fail_after,
            }) as Box<dyn FrameSource>)
        })
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn fast_config() -> HubConfig {
        HubConfig {
            idle_poll: Duration::from_millis(10),
            ..HubConfig::default()
        }
    }

    #[test]
    fn device_opens_lazily_and_closes_when_idle() -> Result<()> {
        let live = Arc::new(AtomicUsize::new(0));
        let hub = CameraHub::spawn(counting_opener(live.clone(), None), fast_config())?;
        let stats = hub.stats();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(stats.device_opens(), 0);

        let sub = hub.subscribe()?;
        let frame = sub.next_frame(Duration::from_secs(2))?.expect("frame");
        assert_eq!((frame.width, frame.height), (4, 4));
        assert!(stats.device_open());
        assert_eq!(live.load(Ordering::SeqCst), 1);

        drop(frame);
        drop(sub);
        assert!(wait_for(|| !stats.device_open()));
        assert_eq!(live.load(Ordering::SeqCst), 0);

        hub.stop()?;
        Ok(())
    }

    #[test]
    fn subscribers_share_one_device() -> Result<()> {
        let live = Arc::new(AtomicUsize::new(0));
        let hub = CameraHub::spawn(counting_opener(live.clone(), None), fast_config())?;
        let a = hub.subscribe()?;
        let b = hub.subscribe()?;
        let fa = a.next_frame(Duration::from_secs(2))?.expect("frame a");
        let fb = b.next_frame(Duration::from_secs(2))?.expect("frame b");
        assert!(fa.sequence >= 1 && fb.sequence >= 1);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(hub.stats().device_opens(), 1);
        assert_eq!(hub.stats().subscribers(), 2);

        drop(a);
        let stats = hub.stats();
        assert!(wait_for(|| stats.subscribers() == 1));
        assert!(b.next_frame(Duration::from_secs(2))?.is_some());
        hub.stop()?;
        assert_eq!(live.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn unread_subscriber_does_not_hold_back_others() -> Result<()> {
        let live = Arc::new(AtomicUsize::new(0));
        let hub = CameraHub::spawn(counting_opener(live.clone(), None), fast_config())?;
        let _idle = hub.subscribe()?;
        let busy = hub.subscribe()?;

        let mut last = 0;
        for _ in 0..20 {
            let frame = busy.next_frame(Duration::from_secs(2))?.expect("frame");
            assert!(frame.sequence > last);
            last = frame.sequence;
        }
        assert_eq!(hub.stats().subscribers(), 2);
        hub.stop()?;
        Ok(())
    }

    #[test]
    fn read_failure_disconnects_subscribers() -> Result<()> {
        let live = Arc::new(AtomicUsize::new(0));
        let hub = CameraHub::spawn(counting_opener(live.clone(), Some(3)), fast_config())?;
        let sub = hub.subscribe()?;

        let mut result = Ok(None);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            result = sub.next_frame(Duration::from_millis(50));
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ShotError::DeviceUnavailable(_))));
        assert!(wait_for(|| live.load(Ordering::SeqCst) == 0));
        hub.stop()?;
        Ok(())
    }

    #[test]
    fn failed_open_is_reported_to_subscriber() -> Result<()> {
        let opener: SourceOpener = Box::new(|| Err(anyhow!("no such device")));
        let hub = CameraHub::spawn(opener, fast_config())?;
        let sub = hub.subscribe()?;
        let result = sub.next_frame(Duration::from_secs(2));
        assert!(matches!(result, Err(ShotError::DeviceUnavailable(_))));
        hub.stop()?;
        Ok(())
    }
}
