//! Bench diagnostic for ADS1119 converters.
//!
//! Takes one conversion (or one every `--watch` seconds) from a converter
//! and prints the raw code and voltages. With `--extra` it also samples the
//! gain-4 and single-ended configurations and echoes the configuration
//! register after each, which is the quickest way to tell a wiring fault
//! from a front-end fault.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pool_sensors::config::parse_address;
use pool_sensors::peripheral::ads1119::{Ads1119, Config, Gain, Mux, PollPolicy, Sample};
use pool_sensors::transport::LinuxI2c;

/// Read voltages from an ADS1119 on a Linux I2C bus
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// I2C bus number (the N in /dev/i2c-N)
    bus: u8,

    /// 7-bit converter address, hex (0x40) or decimal
    #[arg(value_parser = parse_address)]
    address: u8,

    /// Also sample gain 4, AIN0-AGND and AIN1-AGND
    #[arg(short = 'x', long)]
    extra: bool,

    /// Divide the differential voltage by this front-end gain
    #[arg(short = 'g', long)]
    gain_opamp: Option<f64>,

    /// Repeat every N seconds until interrupted
    #[arg(short = 'w', long)]
    watch: Option<u64>,

    /// Give up after this many status polls, 10 ms apart
    #[arg(long, default_value_t = 100)]
    max_polls: u32,

    /// Log every protocol step
    #[arg(short = 'd', long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("pool_sensors=trace".parse()?),
            )
            .init();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let poll = PollPolicy::new(Duration::from_millis(10), args.max_polls);

    loop {
        let mut bus = LinuxI2c::open(args.bus)
            .with_context(|| format!("failed to open I2C bus {}", args.bus))?;

        let differential = Config::default();
        let (sample, _) = capture(&mut bus, &args, differential, poll).await?;
        match args.gain_opamp {
            Some(gain) => println!(
                "Diff: {}, VIn={:.3}V",
                sample,
                sample.voltage / gain
            ),
            None => println!("Diff: {}", sample),
        }

        if args.extra {
            let configs = [
                ("Diff x4", differential.with_gain(Gain::Four)),
                ("A0", differential.with_mux(Mux::Ain0Agnd)),
                ("A1", differential.with_mux(Mux::Ain1Agnd)),
            ];
            for (label, config) in configs {
                let (sample, readback) = capture(&mut bus, &args, config, poll).await?;
                println!("{}: {}, config=0x{:02X}", label, sample, readback);
            }
        }

        match args.watch {
            Some(secs) => {
                drop(bus);
                tokio::time::sleep(Duration::from_secs(secs)).await;
                println!();
            }
            None => return Ok(()),
        }
    }
}

/// Run one conversion with `config`, returning the sample and the
/// configuration register as the chip reports it afterwards.
async fn capture(
    bus: &mut LinuxI2c,
    args: &Args,
    config: Config,
    poll: PollPolicy,
) -> Result<(Sample, u8)> {
    let mut adc = Ads1119::new(bus, args.address)
        .with_config(config)
        .with_poll_policy(poll);

    let sample = adc
        .read_voltage()
        .await
        .with_context(|| format!("conversion failed at 0x{:02x}", args.address))?;
    let readback = adc.read_config().await?;

    let written = adc.config().to_byte();
    if readback != written {
        eprintln!(
            "warning: wrote config 0x{:02X}, chip reports 0x{:02X}",
            written, readback
        );
    }
    Ok((sample, readback))
}
