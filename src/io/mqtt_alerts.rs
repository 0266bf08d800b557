//! MQTT alert publisher
//!
//! Publishes every alert as JSON on the configured topic with QoS 1.
//! The rumqttc event loop runs as its own task and reconnects on errors.

use crate::domain::alert::AlertEvent;
use crate::infra::config::Config;
use crate::services::dispatcher::{DispatchError, Notifier};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct MqttNotifier {
    client: AsyncClient,
    topic: String,
}

impl MqttNotifier {
    /// Create the client. The returned event loop must be driven with
    /// [`run_event_loop`] for anything to be sent.
    pub fn new(config: &Config) -> (Self, EventLoop) {
        let client_id = format!("occupancy-{}-{}", config.site_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 32);
        let notifier = Self { client, topic: config.mqtt_topic().to_string() };
        (notifier, eventloop)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Poll the MQTT connection until shutdown
pub async fn run_event_loop(mut eventloop: EventLoop, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_alerts_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        debug!(pkid = %ack.pkid, "mqtt_alerts_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_alerts_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("mqtt_alerts_shutdown");
                return;
            }
        }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn notify(&self, alert: &AlertEvent) -> Result<(), DispatchError> {
        let payload =
            serde_json::to_vec(alert).map_err(|e| DispatchError::Transport(e.to_string()))?;
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}
