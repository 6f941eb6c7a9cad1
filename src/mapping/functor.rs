//! Per-mapping event handler.

use super::action::{ActionConfig, ActionMode};
use super::error::DispatchError;
use super::motion::MotionCommand;
use crate::controller::InputEvent;
use crate::output::{MouseButton, OutputSink, Routing, RoutingState, SimCommandOutput};
use crate::wiggle::WiggleController;
use std::sync::Arc;
use tracing::{debug, warn};

const WHEEL_DOWN_TICKS: i32 = 1;
// up scrolls 16 steps per press, down only one
const WHEEL_UP_TICKS: i32 = -16;

/// Shared services every mapping dispatches through.
pub struct DispatchContext {
    pub sink: Arc<OutputSink>,
    pub routing: Arc<RoutingState>,
    pub wiggle: Arc<WiggleController>,
    /// Simulator backend, when one is connected
    pub sim: Option<Arc<dyn SimCommandOutput>>,
}

/// Turns input events into mouse output according to one `ActionConfig`.
pub struct EventFunctor {
    config: ActionConfig,
    context: Arc<DispatchContext>,
}

impl EventFunctor {
    pub fn new(mut config: ActionConfig, context: Arc<DispatchContext>) -> Self {
        if let Err(e @ DispatchError::ConfigError(_)) = config.validate() {
            warn!("Mapping will not produce output: {}", e);
        }
        if config.normalize() {
            warn!("Mapping parameters adjusted into range: {:?}", config);
        }
        Self { config, context }
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    pub fn process(&self, event: &InputEvent) -> Result<(), DispatchError> {
        let mode = self.config.action_mode.ok_or_else(|| {
            DispatchError::ConfigError(format!(
                "mapping for {} has no recognised action mode",
                event.input_id()
            ))
        })?;
        let routing = self.context.routing.snapshot();
        debug!("{:?} on {} ({:?})", mode, event.input_id(), routing);

        match mode {
            ActionMode::MouseButton => self.mouse_button(event, routing),
            ActionMode::MouseMotion => self.mouse_motion(event, routing),
            ActionMode::MouseWiggleOn | ActionMode::MouseWiggleOff => self.wiggle(mode, event),
            ActionMode::SimCommand => self.sim_command(event),
        }
    }

    fn mouse_button(&self, event: &InputEvent, routing: Routing) -> Result<(), DispatchError> {
        if self.config.motion_input {
            return Err(DispatchError::ConfigError(
                "button mode cannot take motion input".to_string(),
            ));
        }
        let pressed = self.require_edge(event, ActionMode::MouseButton)?;
        let sink = &self.context.sink;

        match (self.config.button_id, pressed) {
            (MouseButton::WheelDown, true) => sink.wheel(routing, WHEEL_DOWN_TICKS)?,
            (MouseButton::WheelUp, true) => sink.wheel(routing, WHEEL_UP_TICKS)?,
            (MouseButton::WheelDown | MouseButton::WheelUp, false) => {}
            (button, pressed) => sink.button(routing, button, pressed)?,
        }
        Ok(())
    }

    fn mouse_motion(&self, event: &InputEvent, routing: Routing) -> Result<(), DispatchError> {
        let profile = self.config.motion_profile();
        let command = match *event {
            InputEvent::Axis { value, .. } => profile.axis_motion(value),
            InputEvent::Hat { vector, .. } => profile.hat_motion(vector),
            InputEvent::Button { pressed, .. } | InputEvent::Key { pressed, .. } => {
                profile.button_motion(pressed)
            }
        };

        let sink = &self.context.sink;
        match command {
            MotionCommand::Absolute { dx, dy } => sink.motion(routing, dx, dy)?,
            MotionCommand::Accelerated {
                direction,
                min_speed,
                max_speed,
                ramp_seconds,
            } => sink.acceleration(routing, direction, min_speed, max_speed, ramp_seconds)?,
        }
        Ok(())
    }

    fn wiggle(&self, mode: ActionMode, event: &InputEvent) -> Result<(), DispatchError> {
        let pressed = self.require_edge(event, mode)?;
        if pressed == self.config.exec_on_release {
            return Ok(());
        }
        match mode {
            ActionMode::MouseWiggleOn => self.context.wiggle.start(),
            _ => self.context.wiggle.stop(),
        }
    }

    fn sim_command(&self, event: &InputEvent) -> Result<(), DispatchError> {
        let command = self.config.command.as_deref().unwrap_or_default();
        let sim = match &self.context.sim {
            Some(sim) if sim.is_valid(command) => sim,
            _ => {
                return Err(DispatchError::ConfigError(format!(
                    "simulator command '{}' is not available",
                    command
                )))
            }
        };

        let pressed = match *event {
            InputEvent::Axis { .. } => return Ok(()),
            InputEvent::Hat { vector, .. } => !vector.is_center(),
            InputEvent::Button { pressed, .. } | InputEvent::Key { pressed, .. } => pressed,
        };
        if pressed {
            debug!("Simulator command {} ({:?})", command, self.config.value);
            sim.execute(command, self.config.value)?;
        }
        Ok(())
    }

    fn require_edge(&self, event: &InputEvent, mode: ActionMode) -> Result<bool, DispatchError> {
        event.edge().ok_or_else(|| {
            DispatchError::ConfigError(format!(
                "{} mode needs a button or key, but is bound to {}",
                mode.display_name(),
                event.input_id()
            ))
        })
    }
}
