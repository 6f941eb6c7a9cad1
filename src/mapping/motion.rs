//! Speed computation for mouse motion mappings.
//!
//! Everything here is pure. The ramp itself is evaluated by the output side
//! (see `output::mouse_controller`); this module only decides which command to
//! send for one input sample.

use crate::controller::HatVector;

/// Axis samples closer to the centre than this produce no motion at all.
pub const AXIS_DEADZONE: f64 = 0.05;

/// Direction value that routes an axis to horizontal motion. Every other
/// direction drives the vertical component.
pub const HORIZONTAL_DIRECTION: u16 = 90;

/// A single command for the output sink.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MotionCommand {
    /// Constant velocity; `None` components are left as they are.
    Absolute { dx: Option<f64>, dy: Option<f64> },
    /// Ramp from min to max speed along `direction` (degrees, 0 = up).
    Accelerated {
        direction: f64,
        min_speed: f64,
        max_speed: f64,
        ramp_seconds: f64,
    },
}

impl MotionCommand {
    pub const STOP: MotionCommand = MotionCommand::Absolute {
        dx: Some(0.0),
        dy: Some(0.0),
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionProfile {
    pub direction: u16,
    pub min_speed: f64,
    pub max_speed: f64,
    pub time_to_max_speed: f64,
}

impl MotionProfile {
    /// Signed speed for an axis sample.
    pub fn axis_delta(&self, value: f64) -> f64 {
        let value = value.clamp(-1.0, 1.0);
        if value.abs() < AXIS_DEADZONE {
            return 0.0;
        }
        let speed = self.min_speed + value.abs() * (self.max_speed - self.min_speed);
        speed.copysign(value)
    }

    /// One-shot motion for an axis sample, on the configured axis only.
    pub fn axis_motion(&self, value: f64) -> MotionCommand {
        let delta = self.axis_delta(value);
        if self.direction == HORIZONTAL_DIRECTION {
            MotionCommand::Absolute {
                dx: Some(delta),
                dy: None,
            }
        } else {
            MotionCommand::Absolute {
                dx: None,
                dy: Some(delta),
            }
        }
    }

    pub fn hat_motion(&self, hat: HatVector) -> MotionCommand {
        match hat_direction(hat) {
            Some(direction) => self.accelerated(direction),
            None => MotionCommand::STOP,
        }
    }

    pub fn button_motion(&self, pressed: bool) -> MotionCommand {
        if pressed {
            self.accelerated(f64::from(self.direction))
        } else {
            MotionCommand::STOP
        }
    }

    fn accelerated(&self, direction: f64) -> MotionCommand {
        MotionCommand::Accelerated {
            direction,
            min_speed: self.min_speed,
            max_speed: self.max_speed,
            ramp_seconds: self.time_to_max_speed,
        }
    }
}

/// Heading of a hat position in degrees (0 = up, 90 = right), `None` when
/// centred.
pub fn hat_direction(hat: HatVector) -> Option<f64> {
    if hat.is_center() {
        return None;
    }
    let angle = f64::from(-hat.y).atan2(f64::from(hat.x)).to_degrees() + 90.0;
    Some(angle.rem_euclid(360.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile(direction: u16) -> MotionProfile {
        MotionProfile {
            direction,
            min_speed: 5.0,
            max_speed: 15.0,
            time_to_max_speed: 1.0,
        }
    }

    #[test]
    fn horizontal_axis_at_half_deflection() {
        assert_eq!(
            profile(90).axis_motion(0.5),
            MotionCommand::Absolute {
                dx: Some(10.0),
                dy: None
            }
        );
    }

    #[test]
    fn vertical_axis_keeps_sign() {
        assert_eq!(
            profile(0).axis_motion(-1.0),
            MotionCommand::Absolute {
                dx: None,
                dy: Some(-15.0)
            }
        );
    }

    #[test]
    fn deadzone_edge_is_inclusive_of_motion() {
        assert_eq!(profile(0).axis_delta(0.049), 0.0);
        assert!(profile(0).axis_delta(0.05) >= 5.0);
    }

    #[test]
    fn hat_headings() {
        let cases = [
            ((0, 1), 0.0),
            ((1, 1), 45.0),
            ((1, 0), 90.0),
            ((1, -1), 135.0),
            ((0, -1), 180.0),
            ((-1, -1), 225.0),
            ((-1, 0), 270.0),
            ((-1, 1), 315.0),
        ];
        for ((x, y), expected) in cases {
            let angle = hat_direction(HatVector::new(x, y)).unwrap();
            assert!(
                (angle - expected).abs() < 1e-9,
                "hat ({x}, {y}) gave {angle}, expected {expected}"
            );
        }
    }

    #[test]
    fn centred_hat_stops() {
        assert_eq!(profile(0).hat_motion(HatVector::CENTER), MotionCommand::STOP);
    }

    #[test]
    fn button_ramps_along_configured_direction() {
        assert_eq!(
            profile(270).button_motion(true),
            MotionCommand::Accelerated {
                direction: 270.0,
                min_speed: 5.0,
                max_speed: 15.0,
                ramp_seconds: 1.0
            }
        );
        assert_eq!(profile(270).button_motion(false), MotionCommand::STOP);
    }

    proptest! {
        #[test]
        fn small_samples_never_move(v in -0.0499f64..0.0499, min in 0.0f64..500.0, extra in 0.0f64..500.0) {
            let p = MotionProfile { direction: 0, min_speed: min, max_speed: min + extra, time_to_max_speed: 0.0 };
            prop_assert_eq!(p.axis_delta(v), 0.0);
        }

        #[test]
        fn large_samples_follow_linear_formula(v in 0.05f64..=1.0, negative in any::<bool>(), min in 0.0f64..500.0, extra in 0.0f64..500.0) {
            let max = min + extra;
            let v = if negative { -v } else { v };
            let p = MotionProfile { direction: 90, min_speed: min, max_speed: max, time_to_max_speed: 0.0 };
            let delta = p.axis_delta(v);
            let expected = v.signum() * (min + v.abs() * (max - min));
            prop_assert!((delta - expected).abs() < 1e-9);
            prop_assert!(delta.abs() >= min - 1e-9 && delta.abs() <= max + 1e-9);
        }

        #[test]
        fn hat_heading_stays_in_range(x in -1i8..=1, y in -1i8..=1) {
            if let Some(angle) = hat_direction(HatVector::new(x, y)) {
                prop_assert!((0.0..360.0).contains(&angle));
            }
        }
    }
}
