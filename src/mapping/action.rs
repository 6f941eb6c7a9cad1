//! Mapping action modes and the parameters a mapping is stored with.

use super::error::DispatchError;
use super::motion::MotionProfile;
use crate::output::MouseButton;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// What a mapping does with its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionMode {
    MouseButton = 0,
    MouseMotion = 1,
    MouseWiggleOn = 2,
    MouseWiggleOff = 3,
    SimCommand = 4,
}

impl ActionMode {
    pub const ALL: [ActionMode; 5] = [
        ActionMode::MouseButton,
        ActionMode::MouseMotion,
        ActionMode::MouseWiggleOn,
        ActionMode::MouseWiggleOff,
        ActionMode::SimCommand,
    ];

    /// Identifier used in stored profiles.
    pub fn key(self) -> &'static str {
        match self {
            ActionMode::MouseButton => "MouseButton",
            ActionMode::MouseMotion => "MouseMotion",
            ActionMode::MouseWiggleOn => "MouseWiggleOn",
            ActionMode::MouseWiggleOff => "MouseWiggleOff",
            ActionMode::SimCommand => "SimCommand",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ActionMode::MouseButton => "Mouse button",
            ActionMode::MouseMotion => "Mouse axis",
            ActionMode::MouseWiggleOn => "Wiggle Enable",
            ActionMode::MouseWiggleOff => "Wiggle Disable",
            ActionMode::SimCommand => "Map to SimConnect",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ActionMode::MouseButton => "Maps the input to a mouse button or wheel step",
            ActionMode::MouseMotion => "Maps the input to pointer motion",
            ActionMode::MouseWiggleOn => "Starts periodically wiggling the pointer",
            ActionMode::MouseWiggleOff => "Stops wiggling the pointer",
            ActionMode::SimCommand => "Runs a simulator command when the input is pressed",
        }
    }
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ActionMode {
    type Err = DispatchError;

    /// Accepts the variant name (any case) or its numeric value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(number) = s.parse::<i64>() {
            return Self::ALL
                .into_iter()
                .find(|mode| *mode as i64 == number)
                .ok_or_else(|| DispatchError::ConfigError(format!("unknown action mode {}", number)));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| DispatchError::ConfigError(format!("unknown action mode '{}'", s)))
    }
}

/// Stored parameters of a single mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ActionConfig {
    /// `None` when the stored mode was not recognised; such a mapping is inert.
    #[serde(rename = "mode", serialize_with = "write_mode", deserialize_with = "read_mode")]
    pub action_mode: Option<ActionMode>,
    #[serde(serialize_with = "write_button", deserialize_with = "read_button")]
    pub button_id: MouseButton,
    /// Degrees, 0 = up, 90 = right
    #[serde(deserialize_with = "read_direction")]
    pub direction: u16,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Seconds
    pub time_to_max_speed: f64,
    #[serde(rename = "exec_on_release")]
    pub exec_on_release: bool,
    pub motion_input: bool,
    /// Simulator command name, used by `SimCommand` mappings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Data sent along with the simulator command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            action_mode: Some(ActionMode::MouseButton),
            button_id: MouseButton::Left,
            direction: 0,
            min_speed: 5.0,
            max_speed: 15.0,
            time_to_max_speed: 1.0,
            exec_on_release: false,
            motion_input: false,
            command: None,
            value: None,
        }
    }
}

impl ActionConfig {
    /// Sets the lower speed bound, lifting the upper bound if needed.
    pub fn set_min_speed(&mut self, speed: f64) {
        let speed = speed.max(0.0);
        self.min_speed = speed;
        if self.max_speed < speed {
            self.max_speed = speed;
        }
    }

    /// Sets the upper speed bound, lowering the lower bound if needed.
    pub fn set_max_speed(&mut self, speed: f64) {
        let speed = speed.max(0.0);
        self.max_speed = speed;
        if self.min_speed > speed {
            self.min_speed = speed;
        }
    }

    pub fn set_direction(&mut self, degrees: i32) {
        self.direction = wrap_direction(i64::from(degrees));
    }

    pub fn set_time_to_max_speed(&mut self, seconds: f64) {
        self.time_to_max_speed = seconds.max(0.0);
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        let mode = self
            .action_mode
            .ok_or_else(|| DispatchError::ConfigError("unrecognised action mode".to_string()))?;
        if mode == ActionMode::MouseButton && self.motion_input {
            return Err(DispatchError::ConfigError(
                "button mode cannot take motion input".to_string(),
            ));
        }
        if mode == ActionMode::SimCommand
            && self.command.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(DispatchError::ConfigError(
                "simulator mapping has no command".to_string(),
            ));
        }
        if self.min_speed > self.max_speed {
            return Err(DispatchError::RangeError {
                min_speed: self.min_speed,
                max_speed: self.max_speed,
            });
        }
        Ok(())
    }

    /// Brings stored values back into range. Returns `true` if anything was
    /// changed.
    pub fn normalize(&mut self) -> bool {
        let before = self.clone();
        self.min_speed = self.min_speed.max(0.0);
        self.max_speed = self.max_speed.max(0.0);
        self.time_to_max_speed = self.time_to_max_speed.max(0.0);
        self.direction %= 360;
        if self.min_speed > self.max_speed {
            warn!(
                "Min speed {} exceeds max speed {}, raising max speed",
                self.min_speed, self.max_speed
            );
            self.max_speed = self.min_speed;
        }
        *self != before
    }

    pub fn motion_profile(&self) -> MotionProfile {
        MotionProfile {
            direction: self.direction,
            min_speed: self.min_speed,
            max_speed: self.max_speed,
            time_to_max_speed: self.time_to_max_speed,
        }
    }
}

fn wrap_direction(degrees: i64) -> u16 {
    // rem_euclid(360) always fits
    degrees.rem_euclid(360) as u16
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(i64),
    Text(String),
}

fn read_mode<'de, D>(deserializer: D) -> Result<Option<ActionMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawValue::deserialize(deserializer)?;
    let parsed = match &raw {
        RawValue::Number(n) => n.to_string().parse::<ActionMode>(),
        RawValue::Text(s) => s.parse::<ActionMode>(),
    };
    match parsed {
        Ok(mode) => Ok(Some(mode)),
        Err(e) => {
            warn!("{}, mapping will be inactive", e);
            Ok(None)
        }
    }
}

fn write_mode<S>(mode: &Option<ActionMode>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match mode {
        Some(mode) => serializer.serialize_str(mode.key()),
        None => serializer.serialize_str("unknown"),
    }
}

fn read_button<'de, D>(deserializer: D) -> Result<MouseButton, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawValue::deserialize(deserializer)?;
    let id = match &raw {
        RawValue::Number(n) => u8::try_from(*n).ok(),
        RawValue::Text(s) => s.trim().parse::<u8>().ok(),
    };
    match id.and_then(MouseButton::from_id) {
        Some(button) => Ok(button),
        None => {
            let shown = match raw {
                RawValue::Number(n) => n.to_string(),
                RawValue::Text(s) => s,
            };
            warn!("Unknown mouse button id '{}', using left button", shown);
            Ok(MouseButton::Left)
        }
    }
}

fn write_button<S>(button: &MouseButton, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(button.id())
}

fn read_direction<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(wrap_direction(i64::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_names_and_numbers() {
        assert_eq!("mousewiggleon".parse::<ActionMode>().unwrap(), ActionMode::MouseWiggleOn);
        assert_eq!("MouseMotion".parse::<ActionMode>().unwrap(), ActionMode::MouseMotion);
        assert_eq!("1".parse::<ActionMode>().unwrap(), ActionMode::MouseMotion);
        assert_eq!(" 3 ".parse::<ActionMode>().unwrap(), ActionMode::MouseWiggleOff);
        assert!(matches!(
            "7".parse::<ActionMode>(),
            Err(DispatchError::ConfigError(_))
        ));
        assert!("joystick".parse::<ActionMode>().is_err());
        assert_eq!("simcommand".parse::<ActionMode>().unwrap(), ActionMode::SimCommand);
    }

    #[test]
    fn raising_min_lifts_max() {
        let mut config = ActionConfig::default();
        config.set_min_speed(20.0);
        assert_eq!((config.min_speed, config.max_speed), (20.0, 20.0));
    }

    #[test]
    fn lowering_max_drops_min() {
        let mut config = ActionConfig::default();
        config.set_max_speed(2.0);
        assert_eq!((config.min_speed, config.max_speed), (2.0, 2.0));

        config.set_max_speed(-4.0);
        assert_eq!((config.min_speed, config.max_speed), (0.0, 0.0));
    }

    #[test]
    fn direction_wraps() {
        let mut config = ActionConfig::default();
        config.set_direction(450);
        assert_eq!(config.direction, 90);
        config.set_direction(-90);
        assert_eq!(config.direction, 270);
    }

    #[test]
    fn inverted_pair_is_reported_then_normalized() {
        let mut config = ActionConfig {
            min_speed: 30.0,
            max_speed: 10.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DispatchError::RangeError {
                min_speed,
                max_speed
            }) if min_speed == 30.0 && max_speed == 10.0
        ));
        assert!(config.normalize());
        assert_eq!(config.max_speed, 30.0);
        assert!(config.validate().is_ok());
        assert!(!config.normalize());
    }

    #[test]
    fn button_mode_rejects_motion_input() {
        let config = ActionConfig {
            motion_input: true,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DispatchError::ConfigError(_))));
    }

    #[test]
    fn sim_mapping_needs_a_command() {
        let mut config = ActionConfig {
            action_mode: Some(ActionMode::SimCommand),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DispatchError::ConfigError(_))));
        config.command = Some("GEAR_TOGGLE".to_string());
        assert!(config.validate().is_ok());

        let stored: ActionConfig =
            toml::from_str("mode = \"SimCommand\"\ncommand = \"AP_ALT_VAR_SET_ENGLISH\"\nvalue = 3000").unwrap();
        assert_eq!(stored.command.as_deref(), Some("AP_ALT_VAR_SET_ENGLISH"));
        assert_eq!(stored.value, Some(3000.0));
    }

    #[test]
    fn loads_stored_attributes() {
        let config: ActionConfig = toml::from_str(
            r#"
            mode = "MouseMotion"
            button-id = 11
            direction = 450
            min-speed = 2
            max-speed = 40.5
            time-to-max-speed = 0.25
            exec_on_release = true
            motion-input = true
            "#,
        )
        .unwrap();
        assert_eq!(config.action_mode, Some(ActionMode::MouseMotion));
        assert_eq!(config.button_id, MouseButton::WheelDown);
        assert_eq!(config.direction, 90);
        assert_eq!(config.min_speed, 2.0);
        assert_eq!(config.max_speed, 40.5);
        assert_eq!(config.time_to_max_speed, 0.25);
        assert!(config.exec_on_release);
        assert!(config.motion_input);
    }

    #[test]
    fn unknown_values_load_as_fallbacks() {
        let config: ActionConfig = toml::from_str("mode = \"teleport\"\nbutton-id = 42").unwrap();
        assert_eq!(config.action_mode, None);
        assert_eq!(config.button_id, MouseButton::Left);
        assert_eq!(config.max_speed, 15.0);

        let numeric: ActionConfig = toml::from_str("mode = 2").unwrap();
        assert_eq!(numeric.action_mode, Some(ActionMode::MouseWiggleOn));
    }

    #[test]
    fn stores_mode_by_name_and_button_by_id() {
        let config = ActionConfig {
            action_mode: Some(ActionMode::MouseWiggleOff),
            button_id: MouseButton::Back,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("mode = \"MouseWiggleOff\""));
        assert!(text.contains("button-id = 5"));
        let back: ActionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
