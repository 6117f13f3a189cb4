//! Item delivery
//!
//! The poller only ever sees [`ItemQueue`]: a bounded, non-blocking hand-off.
//! A forwarder task drains it into the configured sink (MQTT topic or stdout).

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DeliveryConfig, SinkKind};
use crate::items::DeliverableItem;

/// Producer side of the delivery queue
#[derive(Debug, Clone)]
pub struct ItemQueue {
    sender: mpsc::Sender<DeliverableItem>,
}

impl ItemQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeliverableItem>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Fire and forget: a full or closed queue drops the item
    pub fn put(&self, item: DeliverableItem) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                warn!("Delivery queue full, dropping {}", item.key);
                false
            }
            Err(TrySendError::Closed(item)) => {
                warn!("Delivery queue closed, dropping {}", item.key);
                false
            }
        }
    }
}

enum Sink {
    Mqtt { client: AsyncClient, topic: String },
    Stdout,
}

impl Sink {
    fn connect(config: &DeliveryConfig) -> Self {
        match config.sink {
            SinkKind::Stdout => Sink::Stdout,
            SinkKind::Mqtt => {
                let client_id = config.mqtt_client_id.clone().unwrap_or_else(|| {
                    format!("rabbitmq-agent-{}", uuid::Uuid::new_v4().simple())
                });

                let mut mqtt_options =
                    MqttOptions::new(&client_id, &config.mqtt_host, config.mqtt_port);
                mqtt_options.set_keep_alive(Duration::from_secs(30));
                mqtt_options.set_clean_session(true);

                let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

                tokio::spawn(async move {
                    loop {
                        if let Err(e) = eventloop.poll().await {
                            error!("MQTT connection error: {}", e);
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                });

                info!(
                    "Delivering items to MQTT {}:{} on {} as {}",
                    config.mqtt_host, config.mqtt_port, config.topic, client_id
                );
                Sink::Mqtt {
                    client,
                    topic: config.topic.clone(),
                }
            }
        }
    }

    /// Never waits on the broker: a full MQTT request channel drops the item.
    fn send(&self, item: &DeliverableItem) -> Result<()> {
        let payload = serde_json::to_string(item).context("Failed to serialize item")?;
        match self {
            Sink::Mqtt { client, topic } => client
                .try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
                .context("MQTT request channel unavailable, item dropped")?,
            Sink::Stdout => println!("{payload}"),
        }
        Ok(())
    }
}

/// Drain `receiver` into the configured sink until every producer is gone
pub fn spawn_forwarder(
    config: &DeliveryConfig,
    mut receiver: mpsc::Receiver<DeliverableItem>,
) -> JoinHandle<()> {
    let sink = Sink::connect(config);
    tokio::spawn(async move {
        while let Some(item) = receiver.recv().await {
            match sink.send(&item) {
                Ok(()) => debug!("Delivered {}", item.key),
                Err(e) => warn!("Failed to deliver {}: {:#}", item.key, e),
            }
        }
        debug!("Delivery queue closed, forwarder exiting");
    })
}
