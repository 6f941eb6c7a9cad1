use serde::{Deserialize, Serialize};
use std::fmt;

// Button type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonType {
    A,
    B,
    X,
    Y,
    Start,
    Select,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
    Guide,
}

// Analog axis type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisType {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
}

/// Identifies the physical input a mapping is bound to.
///
/// Serialized externally tagged so a profile entry reads
/// `input = { button = "A" }` or `input = { hat = 0 }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputId {
    Button(ButtonType),
    Axis(AxisType),
    Hat(u8),
    Key(u32),
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputId::Button(b) => write!(f, "button {:?}", b),
            InputId::Axis(a) => write!(f, "axis {:?}", a),
            InputId::Hat(h) => write!(f, "hat {}", h),
            InputId::Key(k) => write!(f, "key {}", k),
        }
    }
}

/// 8-way hat position. `y = 1` is up, `(0, 0)` is the centre.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HatVector {
    pub x: i8,
    pub y: i8,
}

impl HatVector {
    pub const CENTER: HatVector = HatVector { x: 0, y: 0 };

    /// Components are reduced to their sign, so any input lands on one of the
    /// nine valid positions.
    pub fn new(x: i8, y: i8) -> Self {
        Self {
            x: x.signum(),
            y: y.signum(),
        }
    }

    pub fn is_center(&self) -> bool {
        *self == Self::CENTER
    }
}

/// One physical input transition, as delivered to the dispatch thread.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Button { id: ButtonType, pressed: bool },
    Key { code: u32, pressed: bool },
    /// Normalized sample in `[-1, 1]`.
    Axis { id: AxisType, value: f64 },
    Hat { id: u8, vector: HatVector },
}

impl InputEvent {
    pub fn input_id(&self) -> InputId {
        match *self {
            InputEvent::Button { id, .. } => InputId::Button(id),
            InputEvent::Key { code, .. } => InputId::Key(code),
            InputEvent::Axis { id, .. } => InputId::Axis(id),
            InputEvent::Hat { id, .. } => InputId::Hat(id),
        }
    }

    /// Press/release edge for buttons and keys, `None` for continuous sources.
    pub fn edge(&self) -> Option<bool> {
        match *self {
            InputEvent::Button { pressed, .. } | InputEvent::Key { pressed, .. } => Some(pressed),
            InputEvent::Axis { .. } | InputEvent::Hat { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hat_components_are_reduced_to_sign() {
        assert_eq!(HatVector::new(5, -3), HatVector { x: 1, y: -1 });
        assert!(HatVector::new(0, 0).is_center());
    }

    #[test]
    fn only_buttons_and_keys_have_edges() {
        let press = InputEvent::Button {
            id: ButtonType::A,
            pressed: true,
        };
        let key = InputEvent::Key {
            code: 30,
            pressed: false,
        };
        let axis = InputEvent::Axis {
            id: AxisType::LeftStickX,
            value: 0.3,
        };
        assert_eq!(press.edge(), Some(true));
        assert_eq!(key.edge(), Some(false));
        assert_eq!(axis.edge(), None);
    }

    #[test]
    fn input_id_parses_from_toml_tables() {
        #[derive(Deserialize)]
        struct Binding {
            input: InputId,
        }
        let b: Binding = toml::from_str(r#"input = { button = "A" }"#).unwrap();
        assert_eq!(b.input, InputId::Button(ButtonType::A));
        let h: Binding = toml::from_str("input = { hat = 0 }").unwrap();
        assert_eq!(h.input, InputId::Hat(0));
    }
}
