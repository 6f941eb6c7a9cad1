//! Turns input events into mouse output.
//!
//! Each stored mapping becomes an [`EventFunctor`] that owns its
//! [`ActionConfig`] and dispatches through a shared [`DispatchContext`]. The
//! [`MappingManager`] routes every incoming event to the functors bound to
//! its input.

pub mod action;
pub mod error;
pub mod functor;
pub mod manager;
pub mod motion;

pub use action::{ActionConfig, ActionMode};
pub use error::DispatchError;
pub use functor::{DispatchContext, EventFunctor};
pub use manager::{MappingEntry, MappingManager};
pub use motion::{MotionCommand, MotionProfile, AXIS_DEADZONE};
