//! Remote output over MQTT
//!
//! Every command is published as one JSON message on the configured topic.
//! The peer on the other side subscribes and replays the commands into its own
//! mouse controller. The connection pump owns the `is_remote` routing flag: if
//! remote routing is configured it is raised once the broker acknowledges the
//! connection, and it is dropped whenever the connection fails.

use super::{MouseButton, OutputError, RemoteOutput, RoutingState};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_MQTT_PORT: u16 = 1883;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub enabled: bool,
    /// `host` or `host:port`
    pub broker: String,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost:1883".to_string(),
            client_id: "mouse-gremlin".to_string(),
            topic: "mouse-gremlin/mouse".to_string(),
            keep_alive_secs: 5,
        }
    }
}

impl RemoteSettings {
    pub fn broker_address(&self) -> Result<(String, u16), OutputError> {
        match self.broker.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    OutputError::Remote(format!("invalid broker port '{}': {}", port, e))
                })?;
                Ok((host.to_string(), port))
            }
            None => Ok((self.broker.clone(), DEFAULT_MQTT_PORT)),
        }
    }
}

/// Wire format of a forwarded mouse command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteMessage {
    Motion {
        dx: Option<f64>,
        dy: Option<f64>,
    },
    Acceleration {
        direction: f64,
        min_speed: f64,
        max_speed: f64,
        time_to_max_speed: f64,
    },
    Button {
        button: u8,
        pressed: bool,
    },
    Wheel {
        ticks: i32,
    },
}

pub struct MqttRemote {
    client: AsyncClient,
    topic: String,
}

impl MqttRemote {
    /// Creates the client and spawns the connection pump on the current
    /// tokio runtime. With `forward` unset the link is kept up but dispatch
    /// is never routed to it.
    pub fn connect(
        settings: &RemoteSettings,
        routing: Arc<RoutingState>,
        forward: bool,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), OutputError> {
        let (host, port) = settings.broker_address()?;
        info!("Connecting remote output to {}:{} ({})", host, port, settings.topic);

        let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(1)));

        let (client, eventloop) = AsyncClient::new(options, 100);
        let link = LinkState::new(routing, forward);
        let pump = tokio::spawn(run_connection(eventloop, link, cancel));

        Ok((
            Self {
                client,
                topic: settings.topic.clone(),
            },
            pump,
        ))
    }

    fn publish(&self, message: RemoteMessage) -> Result<(), OutputError> {
        let payload = serde_json::to_vec(&message)
            .map_err(|e| OutputError::Remote(format!("failed to encode {:?}: {}", message, e)))?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
            .map_err(|e| OutputError::Remote(e.to_string()))
    }
}

impl RemoteOutput for MqttRemote {
    fn send_mouse_motion(&self, dx: Option<f64>, dy: Option<f64>) -> Result<(), OutputError> {
        self.publish(RemoteMessage::Motion { dx, dy })
    }

    fn send_mouse_acceleration(
        &self,
        direction_deg: f64,
        min_speed: f64,
        max_speed: f64,
        ramp_seconds: f64,
    ) -> Result<(), OutputError> {
        self.publish(RemoteMessage::Acceleration {
            direction: direction_deg,
            min_speed,
            max_speed,
            time_to_max_speed: ramp_seconds,
        })
    }

    fn send_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), OutputError> {
        self.publish(RemoteMessage::Button {
            button: button.id(),
            pressed,
        })
    }

    fn send_mouse_wheel(&self, ticks: i32) -> Result<(), OutputError> {
        self.publish(RemoteMessage::Wheel { ticks })
    }
}

/// Maps broker connection changes onto the remote routing flag.
struct LinkState {
    routing: Arc<RoutingState>,
    forward: bool,
}

impl LinkState {
    fn new(routing: Arc<RoutingState>, forward: bool) -> Self {
        if !forward {
            info!("Remote link enabled without remote routing, commands stay local");
        }
        Self { routing, forward }
    }

    fn connected(&self) {
        if self.forward {
            self.routing.set_remote(true);
        }
    }

    fn disconnected(&self) {
        self.routing.set_remote(false);
    }
}

async fn run_connection(mut eventloop: EventLoop, link: LinkState, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Remote connection pump cancelled");
                break;
            }

            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Remote broker accepted connection: {:?}", ack.code);
                    link.connected();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Remote connection error: {}", e);
                    link.disconnected();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
    link.disconnected();
}
