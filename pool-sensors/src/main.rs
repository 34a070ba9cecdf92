use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use pool_sensors::config::Config;
use pool_sensors::daemon::Daemon;
use pool_sensors::home_assistant::{self, MqttPublisher};
use pool_sensors::station;

/// Publish pool pH, ORP and temperature readings to Home Assistant
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'd', long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read every sensor once and log the results
    Read,
    /// Publish Home Assistant discovery messages
    Config,
    /// Read every sensor once and publish the values
    Values,
    /// Publish discovery, then values every interval until stopped
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    pool_sensors::tracing::init_journald_or_stdout(level);

    let config = Config::from_env().context("invalid configuration")?;

    match args.command {
        Command::Read => {
            let readings = station::read_all(&config).await;
            if readings.failures() > 0 {
                bail!("{} sensor(s) failed", readings.failures());
            }
        }
        Command::Config => {
            let mut publisher = connect(&config);
            let result = home_assistant::publish_discovery(&mut publisher, &config.device).await;
            publisher
                .disconnect()
                .await
                .context("discovery not delivered")?;
            result.context("failed to publish discovery")?;
        }
        Command::Values => {
            let readings = station::read_all(&config).await;
            let mut publisher = connect(&config);
            let result = station::publish_readings(&mut publisher, &readings).await;
            publisher.disconnect().await.context("values not delivered")?;
            let published = result.context("failed to publish values")?;
            info!(published, "Values published");
            if readings.failures() > 0 {
                bail!("{} sensor(s) failed", readings.failures());
            }
        }
        Command::Run => {
            if let Err(e) = Daemon::new(config).run().await {
                error!("{:#}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

fn connect(config: &Config) -> MqttPublisher {
    MqttPublisher::connect(&config.mqtt, &config.device.client_id())
}
