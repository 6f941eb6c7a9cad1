//! Local mouse controller
//!
//! Owns the current motion (constant velocity or a ramp towards a maximum
//! speed) and turns it into relative pointer moves on a fixed tick. Motion
//! commands from the dispatch thread only replace the value in a `watch`
//! channel, so they never wait on the tick loop.
//!
//! ```text
//! dispatch thread ──[Motion]──► watch ──► tick task (10ms) ──► PointerDevice
//! dispatch thread ──[press/release/wheel]───────────────────► PointerDevice
//! ```

use super::{LocalOutput, MouseButton, OutputError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw pointer device the controller writes to.
pub trait PointerDevice: Send + 'static {
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), OutputError>;

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), OutputError>;

    fn wheel(&mut self, ticks: i32) -> Result<(), OutputError>;
}

/// Current motion of the pointer, in pixels/sec.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Motion {
    Constant {
        vx: f64,
        vy: f64,
    },
    Accelerated {
        direction_deg: f64,
        min_speed: f64,
        max_speed: f64,
        ramp: Duration,
        started: Instant,
    },
}

impl Motion {
    pub const IDLE: Motion = Motion::Constant { vx: 0.0, vy: 0.0 };

    /// Replaces the given velocity components. A running ramp is dropped and
    /// its untouched component falls back to zero.
    pub fn with_absolute(self, dx: Option<f64>, dy: Option<f64>) -> Motion {
        let (vx, vy) = match self {
            Motion::Constant { vx, vy } => (vx, vy),
            Motion::Accelerated { .. } => (0.0, 0.0),
        };
        Motion::Constant {
            vx: dx.unwrap_or(vx),
            vy: dy.unwrap_or(vy),
        }
    }

    pub fn velocity(&self, now: Instant) -> (f64, f64) {
        match *self {
            Motion::Constant { vx, vy } => (vx, vy),
            Motion::Accelerated {
                direction_deg,
                min_speed,
                max_speed,
                ramp,
                started,
            } => {
                let elapsed = now.saturating_duration_since(started);
                let speed = ramp_speed(min_speed, max_speed, ramp, elapsed);
                direction_vector(direction_deg, speed)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(*self, Motion::Constant { vx, vy } if vx == 0.0 && vy == 0.0)
    }
}

/// Linear ramp from `min_speed` to `max_speed` over `ramp`.
pub fn ramp_speed(min_speed: f64, max_speed: f64, ramp: Duration, elapsed: Duration) -> f64 {
    if ramp.is_zero() {
        return max_speed;
    }
    let progress = (elapsed.as_secs_f64() / ramp.as_secs_f64()).clamp(0.0, 1.0);
    min_speed + (max_speed - min_speed) * progress
}

/// Splits a speed along a heading where 0° is up and 90° is right.
/// Screen y grows downward.
pub fn direction_vector(direction_deg: f64, speed: f64) -> (f64, f64) {
    let rad = direction_deg.to_radians();
    (speed * rad.sin(), -speed * rad.cos())
}

/// [`LocalOutput`] implementation driving a [`PointerDevice`].
pub struct MouseController {
    motion_tx: watch::Sender<Motion>,
    device: Arc<Mutex<Box<dyn PointerDevice>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MouseController {
    /// Starts the tick loop. Must be called from within a tokio runtime.
    pub fn spawn(device: Box<dyn PointerDevice>, tick: Duration) -> Self {
        info!("Starting mouse controller with {}ms tick", tick.as_millis());
        let (motion_tx, motion_rx) = watch::channel(Motion::IDLE);
        let device = Arc::new(Mutex::new(device));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_motion_loop(
            motion_rx,
            device.clone(),
            tick,
            cancel.clone(),
        ));

        Self {
            motion_tx,
            device,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn current_motion(&self) -> Motion {
        *self.motion_tx.borrow()
    }

    /// Stops the tick loop and waits for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    warn!("Mouse controller task panicked: {}", e);
                }
            }
            None => debug!("Mouse controller already shut down"),
        }
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(&mut dyn PointerDevice) -> Result<T, OutputError>,
    ) -> Result<T, OutputError> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| OutputError::Device("pointer device lock poisoned".to_string()))?;
        f(&mut **device)
    }
}

impl Drop for MouseController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LocalOutput for MouseController {
    fn set_absolute_motion(&self, dx: Option<f64>, dy: Option<f64>) -> Result<(), OutputError> {
        self.motion_tx.send_modify(|m| *m = m.with_absolute(dx, dy));
        Ok(())
    }

    fn set_accelerated_motion(
        &self,
        direction_deg: f64,
        min_speed: f64,
        max_speed: f64,
        ramp_seconds: f64,
    ) -> Result<(), OutputError> {
        let ramp = Duration::try_from_secs_f64(ramp_seconds.max(0.0)).unwrap_or(Duration::ZERO);
        self.motion_tx.send_replace(Motion::Accelerated {
            direction_deg,
            min_speed,
            max_speed,
            ramp,
            started: Instant::now(),
        });
        Ok(())
    }

    fn mouse_press(&self, button: MouseButton) -> Result<(), OutputError> {
        self.with_device(|d| d.button(button, true))
    }

    fn mouse_release(&self, button: MouseButton) -> Result<(), OutputError> {
        self.with_device(|d| d.button(button, false))
    }

    fn mouse_wheel(&self, ticks: i32) -> Result<(), OutputError> {
        self.with_device(|d| d.wheel(ticks))
    }
}

/// Sub-pixel remainder carried between ticks so slow speeds still move.
#[derive(Debug, Default)]
struct Accumulator {
    x: f64,
    y: f64,
}

impl Accumulator {
    fn advance(&mut self, (vx, vy): (f64, f64), dt: Duration) -> (i32, i32) {
        let secs = dt.as_secs_f64();
        self.x += vx * secs;
        self.y += vy * secs;
        let step_x = self.x.trunc();
        let step_y = self.y.trunc();
        self.x -= step_x;
        self.y -= step_y;
        (step_x as i32, step_y as i32)
    }
}

async fn run_motion_loop(
    motion_rx: watch::Receiver<Motion>,
    device: Arc<Mutex<Box<dyn PointerDevice>>>,
    tick: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut acc = Accumulator::default();
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Mouse controller loop cancelled");
                break;
            }

            _ = interval.tick() => {
                let now = Instant::now();
                let dt = now.saturating_duration_since(last);
                last = now;

                let motion = *motion_rx.borrow();
                if motion.is_idle() {
                    acc = Accumulator::default();
                    continue;
                }

                let (dx, dy) = acc.advance(motion.velocity(now), dt);
                if dx == 0 && dy == 0 {
                    continue;
                }
                match device.lock() {
                    Ok(mut d) => {
                        if let Err(e) = d.move_relative(dx, dy) {
                            warn!("Pointer move failed: {}", e);
                        }
                    }
                    Err(_) => {
                        warn!("Pointer device lock poisoned, stopping motion loop");
                        break;
                    }
                }
            }
        }
    }
}
