//! Sample subsystems that shut down through the coordinator
//!
//! Both follow the same pattern: register first to obtain the early token,
//! then start work that watches it, and drain that work in `graceful_close`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lifecycle::{CancellationToken, ShutdownParticipant, TerminationInfo};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Periodic job loop that stops ticking once shutdown begins
pub struct TickWorker {
    name: String,
    interval: Duration,
    ticks: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickWorker {
    pub fn new(name: impl Into<String>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            interval,
            ticks: Arc::new(AtomicU64::new(0)),
            handle: Mutex::new(None),
        })
    }

    /// Start the tick loop; it exits when `token` is cancelled
    pub fn start(&self, token: CancellationToken) {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            warn!("{} already started", self.name);
            return;
        }

        let name = self.name.clone();
        let ticks = Arc::clone(&self.ticks);
        let mut interval = tokio::time::interval(self.interval);
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!("{} tick #{}", name, n);
                    }
                    () = token.cancelled() => {
                        debug!("{} received cancellation signal", name);
                        break;
                    }
                }
            }
        }));
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ShutdownParticipant for TickWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn graceful_close(&self, info: TerminationInfo) {
        info!("{} waiting close ({})", self.name, info);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("{} loop ended abnormally: {}", self.name, e);
            }
        }
        info!("{} closed after {} ticks", self.name, self.ticks());
    }
}

/// Request handler that refuses new requests after the early token fires
/// and drains the in-flight ones on close
pub struct SimulatedServer {
    name: String,
    request_time: Duration,
    tracker: TaskTracker,
    served: Arc<AtomicU64>,
}

impl SimulatedServer {
    pub fn new(name: impl Into<String>, request_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            request_time,
            tracker: TaskTracker::new(),
            served: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Accept one request unless shutdown has begun
    pub fn handle_request(&self, early: &CancellationToken) -> bool {
        if early.is_cancelled() || self.tracker.is_closed() {
            debug!("{} rejected request: shutting down", self.name);
            return false;
        }

        let served = Arc::clone(&self.served);
        let request_time = self.request_time;
        self.tracker.spawn(async move {
            tokio::time::sleep(request_time).await;
            served.fetch_add(1, Ordering::Relaxed);
        });
        true
    }

    /// Generate a request every `every` until `early` is cancelled
    pub fn serve(self: &Arc<Self>, early: CancellationToken, every: Duration) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        server.handle_request(&early);
                    }
                    () = early.cancelled() => break,
                }
            }
        })
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ShutdownParticipant for SimulatedServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn graceful_close(&self, _info: TerminationInfo) {
        self.tracker.close();
        info!("{} waiting for {} in-flight", self.name, self.in_flight());
        self.tracker.wait().await;
        info!("{} closed, served {}", self.name, self.served());
    }
}
