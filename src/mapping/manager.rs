//! Routes input events to the mappings bound to them.

use super::action::ActionConfig;
use super::functor::{DispatchContext, EventFunctor};
use crate::controller::{InputEvent, InputId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One stored mapping: which input it listens to and what it does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub input: InputId,
    #[serde(flatten)]
    pub action: ActionConfig,
}

pub struct MappingManager {
    mappings: HashMap<InputId, Vec<EventFunctor>>,
    context: Arc<DispatchContext>,
}

impl MappingManager {
    pub fn new(context: Arc<DispatchContext>) -> Self {
        Self {
            mappings: HashMap::new(),
            context,
        }
    }

    pub fn from_entries(entries: &[MappingEntry], context: Arc<DispatchContext>) -> Self {
        let mut manager = Self::new(context);
        for entry in entries {
            manager.add(entry.input, entry.action.clone());
        }
        info!(
            "Loaded {} mappings on {} inputs",
            manager.mapping_count(),
            manager.mappings.len()
        );
        manager
    }

    /// Binds another mapping to `input`. Mappings on the same input run in the
    /// order they were added.
    pub fn add(&mut self, input: InputId, config: ActionConfig) {
        debug!("Binding {:?} to {}", config.action_mode, input);
        let functor = EventFunctor::new(config, self.context.clone());
        self.mappings.entry(input).or_default().push(functor);
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.values().map(Vec::len).sum()
    }

    /// Runs every mapping bound to the event's input. A failing mapping is
    /// logged and skipped. Returns the number of mappings that failed.
    pub fn dispatch(&self, event: &InputEvent) -> usize {
        let Some(functors) = self.mappings.get(&event.input_id()) else {
            return 0;
        };

        let mut failed = 0;
        for (index, functor) in functors.iter().enumerate() {
            if let Err(e) = functor.process(event) {
                warn!("Mapping #{} on {} failed: {}", index, event.input_id(), e);
                failed += 1;
            }
        }
        failed
    }

    /// Dispatches events until the channel closes. Blocks the calling thread.
    pub fn run(&self, mut events: mpsc::Receiver<InputEvent>) {
        info!("Dispatch loop started");
        while let Some(event) = events.blocking_recv() {
            self.dispatch(&event);
        }
        info!("Input channel closed, dispatch loop finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{AxisType, ButtonType};
    use crate::mapping::ActionMode;
    use crate::output::recorder::{recording_sink, Call, Recorder};
    use crate::output::{MouseButton, RoutingState};
    use crate::wiggle::{WiggleController, WiggleSettings};

    fn context() -> (Arc<Recorder>, Arc<DispatchContext>) {
        let (recorder, sink) = recording_sink();
        let routing = Arc::new(RoutingState::default());
        let wiggle = Arc::new(WiggleController::new(
            sink.clone(),
            routing.clone(),
            WiggleSettings::default(),
        )
        .unwrap());
        (
            recorder,
            Arc::new(DispatchContext {
                sink,
                routing,
                wiggle,
                sim: None,
            }),
        )
    }

    fn button(button: MouseButton) -> ActionConfig {
        ActionConfig {
            button_id: button,
            ..Default::default()
        }
    }

    #[test]
    fn broken_mapping_does_not_block_the_next() {
        let (recorder, ctx) = context();
        let mut manager = MappingManager::new(ctx);
        let input = InputId::Button(ButtonType::X);
        manager.add(
            input,
            ActionConfig {
                action_mode: None,
                ..Default::default()
            },
        );
        manager.add(input, button(MouseButton::Right));

        let failed = manager.dispatch(&InputEvent::Button {
            id: ButtonType::X,
            pressed: true,
        });
        assert_eq!(failed, 1);
        assert_eq!(recorder.calls(), vec![Call::Press(MouseButton::Right)]);
    }

    #[test]
    fn unbound_inputs_are_ignored() {
        let (recorder, ctx) = context();
        let mut manager = MappingManager::new(ctx);
        manager.add(InputId::Button(ButtonType::A), button(MouseButton::Left));

        assert_eq!(
            manager.dispatch(&InputEvent::Axis {
                id: AxisType::LeftStickX,
                value: 1.0
            }),
            0
        );
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn builds_from_entries() {
        let (_recorder, ctx) = context();
        let entries = vec![
            MappingEntry {
                input: InputId::Key(30),
                action: button(MouseButton::Left),
            },
            MappingEntry {
                input: InputId::Key(30),
                action: ActionConfig {
                    action_mode: Some(ActionMode::MouseMotion),
                    ..Default::default()
                },
            },
            MappingEntry {
                input: InputId::Hat(0),
                action: ActionConfig {
                    action_mode: Some(ActionMode::MouseMotion),
                    ..Default::default()
                },
            },
        ];
        let manager = MappingManager::from_entries(&entries, ctx);
        assert_eq!(manager.mapping_count(), 3);
    }

    #[test]
    fn run_drains_channel_until_closed() {
        let (recorder, ctx) = context();
        let mut manager = MappingManager::new(ctx);
        manager.add(InputId::Key(1), button(MouseButton::WheelDown));

        let (tx, rx) = mpsc::channel(8);
        for _ in 0..3 {
            tx.try_send(InputEvent::Key {
                code: 1,
                pressed: true,
            })
            .unwrap();
        }
        drop(tx);

        std::thread::spawn(move || manager.run(rx)).join().unwrap();
        assert_eq!(recorder.calls(), vec![Call::Wheel(1); 3]);
    }

    #[test]
    fn entry_reads_flattened_attributes() {
        let entry: MappingEntry = toml::from_str(
            r#"
            input = { button = "Start" }
            mode = "MouseWiggleOn"
            exec_on_release = true
            "#,
        )
        .unwrap();
        assert_eq!(entry.input, InputId::Button(ButtonType::Start));
        assert_eq!(entry.action.action_mode, Some(ActionMode::MouseWiggleOn));
        assert!(entry.action.exec_on_release);
        assert_eq!(entry.action.min_speed, 5.0);
    }
}
