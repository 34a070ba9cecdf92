//! MQTT publisher backed by `rumqttc`.
//!
//! The client's event loop runs on its own task for as long as the
//! publisher lives. [`MqttPublisher::disconnect`] queues a DISCONNECT
//! behind everything already published and waits a bounded time for the
//! loop to send it. Requests go out in order, so the DISCONNECT leaving
//! means everything before it left too; anything else is
//! [`PublishError::NotDelivered`].

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, QoS};
use tokio::task::JoinHandle;

use super::{Delivery, PublishError, Publisher};
use crate::config::MqttConfig;
use crate::tracing::prelude::*;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the client's request queue
const REQUEST_CAPACITY: usize = 16;

pub struct MqttPublisher {
    client: AsyncClient,
    connection: JoinHandle<()>,
    disconnect_timeout: Duration,
}

impl MqttPublisher {
    /// Start connecting to the broker. Publishing may begin immediately;
    /// requests queue until the connection is up.
    pub fn connect(config: &MqttConfig, client_id: &str) -> Self {
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(username) = &config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let host = config.host.clone();
        let connection = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT disconnect sent");
                        break;
                    }
                    Ok(event) => trace!(?event, "MQTT event"),
                    Err(e) => {
                        warn!(host = %host, error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        info!(host = %config.host, port = config.port, "Connecting to MQTT broker");
        Self {
            client,
            connection,
            disconnect_timeout: DISCONNECT_TIMEOUT,
        }
    }

    /// How long [`disconnect`](Self::disconnect) waits for the queue to
    /// drain.
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Flush queued messages and close the connection.
    ///
    /// Never waits longer than the disconnect timeout, even when the
    /// request queue is full because the broker was never reached.
    pub async fn disconnect(self) -> Result<(), PublishError> {
        let Self {
            client,
            mut connection,
            disconnect_timeout,
        } = self;

        let flushed = match client.try_disconnect() {
            Ok(()) => tokio::time::timeout(disconnect_timeout, &mut connection)
                .await
                .is_ok(),
            Err(e) => {
                debug!(error = %e, "MQTT request queue full");
                false
            }
        };

        if !flushed {
            warn!("MQTT connection did not flush, dropping queued messages");
            connection.abort();
            return Err(PublishError::NotDelivered(disconnect_timeout));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &mut self,
        topic: &str,
        payload: String,
        delivery: Delivery,
    ) -> Result<(), PublishError> {
        let (qos, retain) = match delivery {
            Delivery::Retained => (QoS::AtLeastOnce, true),
            Delivery::Transient => (QoS::AtMostOnce, false),
        };
        self.client.publish(topic, qos, retain, payload).await?;
        Ok(())
    }
}
