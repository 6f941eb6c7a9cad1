use crate::controller::event::{AxisType, ButtonType, HatVector, InputEvent};
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Hat id used for the D-pad, which gilrs reports as buttons or axes.
pub const DPAD_HAT: u8 = 0;

// D-pad axes report floats; anything past this counts as pushed
const DPAD_AXIS_THRESHOLD: f32 = 0.5;

// Collector settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Substring of the gamepad name to listen to; first pad when unset
    pub gamepad: Option<String>,
    /// Upper bound for one blocking wait on gilrs, also the shutdown latency
    pub poll_timeout_ms: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            gamepad: None,
            poll_timeout_ms: 100,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("Collector thread error: {0}")]
    ThreadError(String),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    // Collector settings
    settings: CollectorSettings,

    // Channel towards the dispatch thread
    event_sender: mpsc::Sender<InputEvent>,

    // Last D-pad position, to synthesise hat transitions
    dpad: HatVector,
}

impl<S: CollectionState> EventCollector<S> {
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<InputEvent>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            event_sender,
            HatVector::CENTER,
        ))
    }

    // Pick the gamepad and transition to Collecting state
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, listening to whatever connects later");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }

            let selected = match &self.settings.gamepad {
                Some(filter) => gamepads
                    .iter()
                    .find(|(_, gamepad)| gamepad.name().contains(filter.as_str())),
                None => gamepads.first(),
            };

            match selected {
                Some((id, gamepad)) => {
                    self.active_gamepad = Some(*id);
                    info!("Selected gamepad: {} ({})", gamepad.name(), id);
                }
                None => warn!(
                    "No gamepad matches {:?}, accepting events from all pads",
                    self.settings.gamepad
                ),
            }
        }

        Ok(self.transition())
    }
}

impl EventCollector<Collecting> {
    // Wait for the next gilrs event and forward what it translates to
    pub fn collect_next_event(&mut self) -> Result<(), CollectorError> {
        let timeout = Duration::from_millis(self.settings.poll_timeout_ms);
        let Some(Event { id, event, .. }) = self.gilrs.next_event_blocking(Some(timeout)) else {
            return Ok(());
        };

        if let Some(active_id) = self.active_gamepad {
            if id != active_id {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                return Ok(());
            }
        }

        if let Some(input_event) = self.convert_gilrs_event(event) {
            match input_event {
                InputEvent::Button { .. } | InputEvent::Hat { .. } => info!(
                    "Input event: {:?} at {}",
                    input_event,
                    Local::now().format("%H:%M:%S.%3f")
                ),
                _ => debug!("Captured event: {:?}", input_event),
            }

            deliver(&self.event_sender, input_event)?;
        }

        Ok(())
    }

    pub fn run_collection_loop(&mut self, cancel: &CancellationToken) {
        info!("Starting Event Collector loop");
        while !cancel.is_cancelled() {
            if let Err(e) = self.collect_next_event() {
                error!("Error collecting event: {}", e);
            }
        }
        info!("Event Collector loop stopped");
    }

    fn convert_gilrs_event(&mut self, event: EventType) -> Option<InputEvent> {
        match event {
            EventType::AxisChanged(Axis::DPadX, value, _) => {
                self.update_dpad(Some(axis_to_hat(value)), None)
            }
            EventType::AxisChanged(Axis::DPadY, value, _) => {
                self.update_dpad(None, Some(axis_to_hat(value)))
            }
            EventType::AxisChanged(axis, value, _) => map_axis(axis).map(|id| InputEvent::Axis {
                id,
                value: f64::from(value.clamp(-1.0, 1.0)),
            }),
            EventType::ButtonPressed(button, _) => self.convert_button(button, true),
            EventType::ButtonReleased(button, _) => self.convert_button(button, false),
            EventType::Connected => {
                info!("Controller connected event detected");
                None
            }
            EventType::Disconnected => {
                warn!("Controller disconnected event detected");
                None
            }
            _ => None,
        }
    }

    fn convert_button(&mut self, button: Button, pressed: bool) -> Option<InputEvent> {
        let step = if pressed { 1 } else { 0 };
        match button {
            Button::DPadUp => self.update_dpad(None, Some(step)),
            Button::DPadDown => self.update_dpad(None, Some(-step)),
            Button::DPadLeft => self.update_dpad(Some(-step), None),
            Button::DPadRight => self.update_dpad(Some(step), None),
            other => map_button(other).map(|id| InputEvent::Button { id, pressed }),
        }
    }

    // Only emits when the resulting hat position actually changed
    fn update_dpad(&mut self, x: Option<i8>, y: Option<i8>) -> Option<InputEvent> {
        let next = HatVector::new(x.unwrap_or(self.dpad.x), y.unwrap_or(self.dpad.y));
        if next == self.dpad {
            return None;
        }
        self.dpad = next;
        Some(InputEvent::Hat {
            id: DPAD_HAT,
            vector: next,
        })
    }
}

/// Runs the gilrs collector on its own OS thread until cancelled.
pub struct CollectorHandle {
    thread: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl CollectorHandle {
    /// Creates the collector inside the worker thread, since the gilrs
    /// context is tied to the thread that opened it, and reports
    /// initialization failures back to the caller.
    pub async fn spawn(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);
        let (ready_tx, ready_rx) = oneshot::channel();
        let loop_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("input-collector".to_string())
            .spawn(move || {
                let collector =
                    EventCollector::create(settings, event_sender).and_then(|c| c.initialize());
                match collector {
                    Ok(mut collecting) => {
                        let _ = ready_tx.send(Ok(()));
                        collecting.run_collection_loop(&loop_cancel);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| CollectorError::ThreadError(e.to_string()))?;

        ready_rx
            .await
            .map_err(|e| CollectorError::ThreadError(e.to_string()))??;

        info!("Event Collector successfully started");
        Ok(Self {
            thread: Some(thread),
            cancel,
        })
    }

    pub fn shutdown(&mut self) -> Result<(), CollectorError> {
        self.cancel.cancel();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| CollectorError::ThreadError("collector thread panicked".to_string())),
            None => {
                debug!("Event Collector already shut down");
                Ok(())
            }
        }
    }
}

/// Axis samples are dropped when dispatch lags, the next one supersedes them.
/// Presses, releases and hat changes wait for room so no edge is lost.
fn deliver(sender: &mpsc::Sender<InputEvent>, event: InputEvent) -> Result<(), CollectorError> {
    match event {
        InputEvent::Axis { .. } => match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("Dispatch busy, dropping {:?}", event);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CollectorError::EventSendError(
                "dispatch channel closed".to_string(),
            )),
        },
        edge => sender
            .blocking_send(edge)
            .map_err(|e| CollectorError::EventSendError(e.to_string())),
    }
}

// Helper function to map gilrs Button to our ButtonType
fn map_button(button: Button) -> Option<ButtonType> {
    match button {
        Button::South => Some(ButtonType::A),
        Button::East => Some(ButtonType::B),
        Button::West => Some(ButtonType::Y),
        Button::North => Some(ButtonType::X),
        Button::Start => Some(ButtonType::Start),
        Button::Select => Some(ButtonType::Select),
        Button::LeftTrigger => Some(ButtonType::LeftBumper),
        Button::RightTrigger => Some(ButtonType::RightBumper),
        Button::LeftThumb => Some(ButtonType::LeftStick),
        Button::RightThumb => Some(ButtonType::RightStick),
        Button::Mode => Some(ButtonType::Guide),
        _ => None,
    }
}

fn map_axis(axis: Axis) -> Option<AxisType> {
    match axis {
        Axis::LeftStickX => Some(AxisType::LeftStickX),
        Axis::LeftStickY => Some(AxisType::LeftStickY),
        Axis::RightStickX => Some(AxisType::RightStickX),
        Axis::RightStickY => Some(AxisType::RightStickY),
        Axis::LeftZ => Some(AxisType::LeftTrigger),
        Axis::RightZ => Some(AxisType::RightTrigger),
        _ => {
            debug!("Ignoring unsupported axis: {:?}", axis);
            None
        }
    }
}

fn axis_to_hat(value: f32) -> i8 {
    if value >= DPAD_AXIS_THRESHOLD {
        1
    } else if value <= -DPAD_AXIS_THRESHOLD {
        -1
    } else {
        0
    }
}
