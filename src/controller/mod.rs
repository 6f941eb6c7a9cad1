//! Input side of the pipeline
//!
//! 1. [`event`] - Input event model shared with the dispatch core
//! 2. [`event_collector`] - gilrs gamepad source, D-pad folded into a hat
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──[InputEvent]──► dispatch thread ──► functors
//!            (own thread)   (mpsc 1000)
//! ```

pub mod event;
pub mod event_collector;

pub use event::{AxisType, ButtonType, HatVector, InputEvent, InputId};
pub use event_collector::{CollectorError, CollectorHandle, CollectorSettings};
