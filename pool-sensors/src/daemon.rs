//! Long-running publishing mode.
//!
//! Publishes discovery once, then a round of readings every configured
//! interval until SIGINT or SIGTERM.

use tokio::signal::unix::{self, SignalKind};
use tokio::time::MissedTickBehavior;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::Config;
use crate::home_assistant::{self, MqttPublisher, PublishError};
use crate::station;
use crate::tracing::prelude::*;

pub struct Daemon {
    config: Config,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        self.tracker.spawn({
            let shutdown = self.shutdown.clone();
            let config = self.config.clone();
            async move {
                let mut publisher =
                    MqttPublisher::connect(&config.mqtt, &config.device.client_id());

                tokio::select! {
                    result = publish_loop(&config, &mut publisher) => {
                        if let Err(e) = result {
                            error!("Publishing stopped: {}", e);
                        }
                        // Nothing left to do without a broker
                        shutdown.cancel();
                    }
                    _ = shutdown.cancelled() => {}
                }

                if let Err(e) = publisher.disconnect().await {
                    warn!("MQTT disconnect failed: {}", e);
                }
            }
        });

        self.tracker.close();

        info!(
            interval_secs = self.config.interval.as_secs(),
            "Started."
        );
        info!("For debugging, set RUST_LOG=pool_sensors=debug or trace.");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
            _ = self.shutdown.cancelled() => {},
        }

        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

async fn publish_loop(config: &Config, publisher: &mut MqttPublisher) -> Result<(), PublishError> {
    home_assistant::publish_discovery(publisher, &config.device).await?;

    let mut ticker = tokio::time::interval(config.interval);
    // A slow 1-Wire read should push the schedule back, not cause a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let readings = station::read_all(config).await;
        let published = station::publish_readings(publisher, &readings).await?;
        debug!(published, failed = readings.failures(), "Round complete");
    }
}
