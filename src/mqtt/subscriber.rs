use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::watch;

use super::router::MeterRouter;
use crate::config::MqttConfig;
use crate::error::{GlowError, Result};
use crate::logging::{StructuredLogger, get_logger};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Substitute the CAD hardware id into the topic template
pub fn topic_for(template: &str, hardware_id: &str) -> String {
    template.replace("{hardwareId}", hardware_id)
}

/// Long-lived subscription to the CAD topic
pub struct MqttSubscriber {
    options: MqttOptions,
    topic: String,
    router: MeterRouter,
    logger: StructuredLogger,
}

impl MqttSubscriber {
    pub fn new(
        cfg: &MqttConfig,
        username: &str,
        password: &str,
        hardware_id: &str,
        router: MeterRouter,
    ) -> Self {
        let client_id = format!("glowmarkt-bridge-{}", uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
        options.set_credentials(username, password);

        Self {
            options,
            topic: topic_for(&cfg.topic_template, hardware_id),
            router,
            logger: get_logger("mqtt"),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run until `shutdown` flips to true; reconnects are handled by the
    /// event loop, the topic is re-subscribed on every ConnAck
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 10);
        self.logger
            .info(&format!("Subscribing to {}", self.topic));

        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        client
                            .subscribe(self.topic.clone(), QoS::AtLeastOnce)
                            .await
                            .map_err(|e| GlowError::mqtt(e.to_string()))?;
                        self.logger.info("Connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Err(e) = self.router.handle_payload(&publish.payload) {
                            self.logger.warn(&format!("Discarding message on {}: {}", publish.topic, e));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.logger.warn(&format!("MQTT connection error: {}", e));
                        if wait_or_shutdown(RECONNECT_DELAY, &mut shutdown).await {
                            break;
                        }
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = client.disconnect().await {
            self.logger.debug(&format!("MQTT disconnect failed: {}", e));
        }
        self.logger.info("MQTT subscriber stopped");
        Ok(())
    }
}

/// Sleep for `delay`; returns true when shutdown was requested meanwhile
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
