//! Background pointer wiggle.
//!
//! While active, a single worker thread nudges the pointer by one pixel and
//! back at random intervals. There is at most one worker per controller;
//! starting twice is a no-op and so is stopping an idle controller.

use crate::mapping::DispatchError;
use crate::output::{OutputSink, Routing, RoutingState};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiggleSettings {
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
    /// Time spent displaced before moving back
    pub hold_secs: f64,
    /// Time spent on the return step before motion is cleared
    pub settle_secs: f64,
}

impl Default for WiggleSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 10.0,
            max_interval_secs: 40.0,
            hold_secs: 1.0,
            settle_secs: 0.5,
        }
    }
}

impl WiggleSettings {
    pub fn validate(&self) -> Result<(), DispatchError> {
        let fields = [
            ("min_interval_secs", self.min_interval_secs),
            ("max_interval_secs", self.max_interval_secs),
            ("hold_secs", self.hold_secs),
            ("settle_secs", self.settle_secs),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DispatchError::ConfigError(format!(
                "wiggle {} must be a finite number of seconds, got {}",
                name, value
            )));
        }
        if !(self.min_interval_secs > 0.0 && self.max_interval_secs > 0.0) {
            return Err(DispatchError::ConfigError(
                "wiggle intervals must be positive".to_string(),
            ));
        }
        if self.min_interval_secs > self.max_interval_secs {
            return Err(DispatchError::ConfigError(format!(
                "wiggle min interval {}s exceeds max interval {}s",
                self.min_interval_secs, self.max_interval_secs
            )));
        }
        if self.hold_secs < 0.0 || self.settle_secs < 0.0 {
            return Err(DispatchError::ConfigError(
                "wiggle hold times must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn next_interval(&self, rng: &mut impl Rng) -> Duration {
        let secs = rng.gen_range(self.min_interval_secs..=self.max_interval_secs);
        Duration::from_secs_f64(secs)
    }
}

struct Worker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Counts a worker as live until dropped on the worker thread.
struct LiveWorker(Arc<AtomicUsize>);

impl LiveWorker {
    fn register(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count.clone())
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WiggleController {
    sink: Arc<OutputSink>,
    routing: Arc<RoutingState>,
    settings: WiggleSettings,
    // held across spawn and join so start/stop never interleave
    worker: Mutex<Option<Worker>>,
    live: Arc<AtomicUsize>,
}

impl WiggleController {
    pub fn new(
        sink: Arc<OutputSink>,
        routing: Arc<RoutingState>,
        settings: WiggleSettings,
    ) -> Result<Self, DispatchError> {
        settings.validate()?;
        Ok(Self {
            sink,
            routing,
            settings,
            worker: Mutex::new(None),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn start(&self) -> Result<(), DispatchError> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| DispatchError::ResourceError("wiggle state lock poisoned".to_string()))?;
        if worker.is_some() {
            debug!("Wiggle already running");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let live = LiveWorker::register(&self.live);
        let sink = self.sink.clone();
        let routing = self.routing.clone();
        let settings = self.settings.clone();

        let handle = thread::Builder::new()
            .name("mouse-wiggle".to_string())
            .spawn(move || {
                let _live = live;
                run_worker(&sink, &routing, &settings, &shutdown_rx);
            })
            .map_err(|e| DispatchError::ResourceError(format!("failed to spawn wiggle worker: {}", e)))?;

        info!("Wiggle started");
        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Signals the worker and waits for it to exit.
    pub fn stop(&self) -> Result<(), DispatchError> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| DispatchError::ResourceError("wiggle state lock poisoned".to_string()))?;
        let Some(Worker { shutdown, handle }) = worker.take() else {
            debug!("Wiggle not running");
            return Ok(());
        };

        // the worker also treats a dropped sender as a stop
        let _ = shutdown.send(());
        drop(shutdown);
        handle
            .join()
            .map_err(|_| DispatchError::ResourceError("wiggle worker panicked".to_string()))?;
        info!("Wiggle stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Number of worker threads that have not exited yet.
    pub fn active_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for WiggleController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop wiggle worker: {}", e);
        }
    }
}

fn run_worker(
    sink: &OutputSink,
    routing: &RoutingState,
    settings: &WiggleSettings,
    shutdown: &mpsc::Receiver<()>,
) {
    let mut rng = rand::thread_rng();
    loop {
        if wiggle_once(sink, routing.snapshot(), settings, shutdown) {
            break;
        }
        let wait = settings.next_interval(&mut rng);
        debug!("Next wiggle in {:.1}s", wait.as_secs_f64());
        if stop_requested(shutdown, wait) {
            break;
        }
    }
    debug!("Wiggle worker exiting");
}

/// Runs one displacement cycle. Returns `true` if a stop arrived meanwhile;
/// motion is cleared either way.
fn wiggle_once(
    sink: &OutputSink,
    routing: Routing,
    settings: &WiggleSettings,
    shutdown: &mpsc::Receiver<()>,
) -> bool {
    step(sink, routing, 1.0);
    let mut stopped = stop_requested(shutdown, Duration::from_secs_f64(settings.hold_secs));
    if !stopped {
        step(sink, routing, -1.0);
        stopped = stop_requested(shutdown, Duration::from_secs_f64(settings.settle_secs));
    }
    step(sink, routing, 0.0);
    stopped
}

fn step(sink: &OutputSink, routing: Routing, delta: f64) {
    if let Err(e) = sink.motion(routing, Some(delta), Some(delta)) {
        warn!("Wiggle step ({}, {}) failed: {}", delta, delta, e);
    }
}

fn stop_requested(shutdown: &mpsc::Receiver<()>, wait: Duration) -> bool {
    match shutdown.recv_timeout(wait) {
        Err(RecvTimeoutError::Timeout) => false,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
    }
}
