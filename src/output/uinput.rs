//! Virtual pointer backed by Linux uinput.

use super::{MouseButton, OutputError, PointerDevice};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use tracing::info;

const DEVICE_NAME: &str = "mouse-gremlin virtual pointer";

pub struct UinputPointer {
    device: VirtualDevice,
}

impl UinputPointer {
    pub fn create() -> Result<Self, OutputError> {
        let mut keys = AttributeSet::<Key>::new();
        for key in [
            Key::BTN_LEFT,
            Key::BTN_RIGHT,
            Key::BTN_MIDDLE,
            Key::BTN_FORWARD,
            Key::BTN_BACK,
        ] {
            keys.insert(key);
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);

        let device = VirtualDeviceBuilder::new()
            .map_err(device_error)?
            .name(DEVICE_NAME)
            .with_keys(&keys)
            .map_err(device_error)?
            .with_relative_axes(&axes)
            .map_err(device_error)?
            .build()
            .map_err(device_error)?;

        info!("Created uinput device '{}'", DEVICE_NAME);
        Ok(Self { device })
    }

    fn emit(&mut self, events: &[InputEvent]) -> Result<(), OutputError> {
        let mut batch = events.to_vec();
        batch.push(InputEvent::new(EventType::SYNCHRONIZATION, 0, 0));
        self.device.emit(&batch).map_err(device_error)
    }
}

impl PointerDevice for UinputPointer {
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), OutputError> {
        self.emit(&[
            InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, dx),
            InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, dy),
        ])
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), OutputError> {
        let key = match button {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Right => Key::BTN_RIGHT,
            MouseButton::Middle => Key::BTN_MIDDLE,
            MouseButton::Forward => Key::BTN_FORWARD,
            MouseButton::Back => Key::BTN_BACK,
            // wheel "buttons" are translated to wheel() before they get here
            MouseButton::WheelUp | MouseButton::WheelDown => return Ok(()),
        };
        self.emit(&[InputEvent::new(EventType::KEY, key.code(), i32::from(pressed))])
    }

    fn wheel(&mut self, ticks: i32) -> Result<(), OutputError> {
        self.emit(&[InputEvent::new(
            EventType::RELATIVE,
            RelativeAxisType::REL_WHEEL.0,
            ticks,
        )])
    }
}

fn device_error(e: std::io::Error) -> OutputError {
    OutputError::Device(e.to_string())
}
