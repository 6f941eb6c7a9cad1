//! Output side: where mouse commands end up.
//!
//! A command is applied locally (injected into the OS input stream), forwarded
//! to a remote peer, or both. Which of the two happens is decided per dispatch
//! from a [`Routing`] snapshot of the process-wide [`RoutingState`].
//!
//! ```text
//!                     ┌─► LocalOutput  (MouseController ─► PointerDevice)
//! functor ─► OutputSink
//!                     └─► RemoteOutput (MQTT publisher)
//! ```

pub mod mouse_controller;
pub mod remote;
#[cfg(target_os = "linux")]
pub mod uinput;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub use mouse_controller::{MouseController, PointerDevice};
pub use remote::{MqttRemote, RemoteMessage, RemoteSettings};

/// Errors raised by an output backend
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Routing asked for a backend that was never configured
    #[error("{0} output is not available")]
    Unavailable(&'static str),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Remote error: {0}")]
    Remote(String),
}

/// Mouse buttons that can be produced, numbered as in stored profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 1,
    Right = 2,
    Middle = 3,
    Forward = 4,
    Back = 5,
    WheelUp = 10,
    WheelDown = 11,
}

impl MouseButton {
    pub const ALL: [MouseButton; 7] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Forward,
        MouseButton::Back,
        MouseButton::WheelUp,
        MouseButton::WheelDown,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.id() == id)
    }

    pub fn is_wheel(self) -> bool {
        matches!(self, MouseButton::WheelUp | MouseButton::WheelDown)
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MouseButton::Left => "Left",
            MouseButton::Right => "Right",
            MouseButton::Middle => "Middle",
            MouseButton::Forward => "Forward",
            MouseButton::Back => "Back",
            MouseButton::WheelUp => "Wheel up",
            MouseButton::WheelDown => "Wheel down",
        };
        f.write_str(name)
    }
}

/// Commands injected into the local OS input stream.
///
/// Implementations must not block: they are called from the dispatch thread.
pub trait LocalOutput: Send + Sync + 'static {
    /// Sets a constant velocity in pixels/sec. `None` leaves that component
    /// as it was.
    fn set_absolute_motion(&self, dx: Option<f64>, dy: Option<f64>) -> Result<(), OutputError>;

    /// Starts a motion in `direction_deg` (0 = up, 90 = right) that ramps from
    /// `min_speed` to `max_speed` over `ramp_seconds` and keeps going until
    /// the next motion command.
    fn set_accelerated_motion(
        &self,
        direction_deg: f64,
        min_speed: f64,
        max_speed: f64,
        ramp_seconds: f64,
    ) -> Result<(), OutputError>;

    fn mouse_press(&self, button: MouseButton) -> Result<(), OutputError>;

    fn mouse_release(&self, button: MouseButton) -> Result<(), OutputError>;

    fn mouse_wheel(&self, ticks: i32) -> Result<(), OutputError>;
}

/// Commands forwarded to a remote peer which applies them on its side.
pub trait RemoteOutput: Send + Sync + 'static {
    fn send_mouse_motion(&self, dx: Option<f64>, dy: Option<f64>) -> Result<(), OutputError>;

    fn send_mouse_acceleration(
        &self,
        direction_deg: f64,
        min_speed: f64,
        max_speed: f64,
        ramp_seconds: f64,
    ) -> Result<(), OutputError>;

    fn send_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), OutputError>;

    fn send_mouse_wheel(&self, ticks: i32) -> Result<(), OutputError>;
}

/// Named simulator commands (SimConnect events and variables on Windows).
///
/// Commands are looked up by name; an unknown name makes the mapping inert.
pub trait SimCommandOutput: Send + Sync + 'static {
    fn is_valid(&self, command: &str) -> bool;

    /// Runs `command`, with `value` as its data when the command takes one.
    fn execute(&self, command: &str, value: Option<f64>) -> Result<(), OutputError>;
}

/// Consistent view of the routing flags for one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Routing {
    pub local: bool,
    pub remote: bool,
}

/// Process-wide routing flags. Both may be set at once (mirrored output).
#[derive(Debug)]
pub struct RoutingState {
    local: AtomicBool,
    remote: AtomicBool,
}

impl RoutingState {
    pub fn new(local: bool, remote: bool) -> Self {
        Self {
            local: AtomicBool::new(local),
            remote: AtomicBool::new(remote),
        }
    }

    pub fn snapshot(&self) -> Routing {
        Routing {
            local: self.local.load(Ordering::Acquire),
            remote: self.remote.load(Ordering::Acquire),
        }
    }

    pub fn set_local(&self, enabled: bool) {
        self.local.store(enabled, Ordering::Release);
    }

    /// Clears the flag of every backend `sink` does not have.
    pub fn retain_available(&self, sink: &OutputSink) {
        if !sink.has_local() && self.local.swap(false, Ordering::AcqRel) {
            warn!("No local output backend, local routing disabled");
        }
        if !sink.has_remote() {
            self.set_remote(false);
        }
    }

    pub fn set_remote(&self, enabled: bool) {
        if self.remote.swap(enabled, Ordering::AcqRel) != enabled {
            debug!("Remote routing {}", if enabled { "enabled" } else { "disabled" });
        }
    }
}

impl Default for RoutingState {
    fn default() -> Self {
        Self::new(true, false)
    }
}

/// Applies one command to the local and/or remote backend.
///
/// Both backends are always attempted when routed; a failure in one does not
/// keep the other from receiving the command. The first error is returned.
pub struct OutputSink {
    local: Option<Arc<dyn LocalOutput>>,
    remote: Option<Arc<dyn RemoteOutput>>,
}

impl OutputSink {
    pub fn new(local: Option<Arc<dyn LocalOutput>>, remote: Option<Arc<dyn RemoteOutput>>) -> Self {
        Self { local, remote }
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn motion(&self, routing: Routing, dx: Option<f64>, dy: Option<f64>) -> Result<(), OutputError> {
        self.route(
            routing,
            |local| local.set_absolute_motion(dx, dy),
            |remote| remote.send_mouse_motion(dx, dy),
        )
    }

    pub fn acceleration(
        &self,
        routing: Routing,
        direction_deg: f64,
        min_speed: f64,
        max_speed: f64,
        ramp_seconds: f64,
    ) -> Result<(), OutputError> {
        self.route(
            routing,
            |local| local.set_accelerated_motion(direction_deg, min_speed, max_speed, ramp_seconds),
            |remote| remote.send_mouse_acceleration(direction_deg, min_speed, max_speed, ramp_seconds),
        )
    }

    pub fn button(&self, routing: Routing, button: MouseButton, pressed: bool) -> Result<(), OutputError> {
        self.route(
            routing,
            |local| {
                if pressed {
                    local.mouse_press(button)
                } else {
                    local.mouse_release(button)
                }
            },
            |remote| remote.send_mouse_button(button, pressed),
        )
    }

    pub fn wheel(&self, routing: Routing, ticks: i32) -> Result<(), OutputError> {
        self.route(
            routing,
            |local| local.mouse_wheel(ticks),
            |remote| remote.send_mouse_wheel(ticks),
        )
    }

    fn route(
        &self,
        routing: Routing,
        on_local: impl FnOnce(&dyn LocalOutput) -> Result<(), OutputError>,
        on_remote: impl FnOnce(&dyn RemoteOutput) -> Result<(), OutputError>,
    ) -> Result<(), OutputError> {
        let local_result = if routing.local {
            match &self.local {
                Some(local) => on_local(local.as_ref()),
                None => Err(OutputError::Unavailable("local")),
            }
        } else {
            Ok(())
        };

        let remote_result = if routing.remote {
            match &self.remote {
                Some(remote) => on_remote(remote.as_ref()),
                None => Err(OutputError::Unavailable("remote")),
            }
        } else {
            Ok(())
        };

        match (local_result, remote_result) {
            (Err(local_err), Err(remote_err)) => {
                warn!("Remote output failed as well: {}", remote_err);
                Err(local_err)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}
