//! ADS1119 16-bit delta-sigma ADC driver.
//!
//! The ADS1119 is an I2C converter with a four-input multiplexer, a
//! selectable gain of 1 or 4 and an internal 2.048 V reference. Unlike
//! register-mapped parts it is driven by command bytes: a conversion is a
//! reset, a configuration write, a start/sync, then status polling until the
//! data-ready flag comes up and finally a read of the 16-bit result.
//!
//! The result register is sent MSB first, which is the opposite of the SMBus
//! word order, so the word has to be byte swapped before it is treated as a
//! two's complement code.
//!
//! Datasheet: <https://www.ti.com/lit/ds/symlink/ads1119.pdf>

use std::fmt;
use std::time::Duration;

use crate::hw_trait::{HwError, Smbus};
use crate::tracing::prelude::*;
use crate::transport::LinuxI2c;

/// Full-scale reference of the internal voltage source.
pub const INTERNAL_REFERENCE_VOLTAGE: f64 = 2.048;

/// Number of codes between zero and positive full scale.
const FULL_SCALE_CODES: f64 = 0x8000 as f64;

/// Status register bit 7: a new conversion result is available.
const STATUS_READY: u8 = 0x80;

/// ADS1119 command bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Reset = 0x06,
    Start = 0x08,
    ReadData = 0x10,
    ReadConfig = 0x20,
    ReadStatus = 0x24,
    WriteConfig = 0x40,
}

impl Command {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Input multiplexer selection (config bits 7:5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mux {
    #[default]
    Ain0Ain1 = 0b000,
    Ain2Ain3 = 0b001,
    Ain1Ain2 = 0b010,
    Ain0Agnd = 0b011,
    Ain1Agnd = 0b100,
    Ain2Agnd = 0b101,
    Ain3Agnd = 0b110,
    /// Both inputs shorted to AVDD/2, for offset calibration
    Shorted = 0b111,
}

/// Programmable gain (config bit 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Gain {
    #[default]
    One = 0,
    Four = 1,
}

impl Gain {
    pub fn factor(self) -> f64 {
        match self {
            Gain::One => 1.0,
            Gain::Four => 4.0,
        }
    }
}

/// Conversion rate (config bits 3:2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DataRate {
    #[default]
    Sps20 = 0b00,
    Sps90 = 0b01,
    Sps330 = 0b10,
    Sps1000 = 0b11,
}

/// Conversion mode (config bit 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConversionMode {
    #[default]
    SingleShot = 0,
    Continuous = 1,
}

/// Voltage reference source (config bit 0)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum VoltageReference {
    #[default]
    Internal,
    /// REFP/REFN inputs, with the applied reference voltage in volts
    External(f64),
}

impl VoltageReference {
    pub fn volts(self) -> f64 {
        match self {
            VoltageReference::Internal => INTERNAL_REFERENCE_VOLTAGE,
            VoltageReference::External(volts) => volts,
        }
    }

    fn bit(self) -> u8 {
        match self {
            VoltageReference::Internal => 0,
            VoltageReference::External(_) => 1,
        }
    }
}

/// Contents of the configuration register.
///
/// The default encodes to `0x00`: AIN0-AIN1 differential, gain 1, 20 SPS,
/// single-shot, internal reference.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Config {
    pub mux: Mux,
    pub gain: Gain,
    pub data_rate: DataRate,
    pub conversion_mode: ConversionMode,
    pub reference: VoltageReference,
}

impl Config {
    pub fn with_mux(mut self, mux: Mux) -> Self {
        self.mux = mux;
        self
    }

    pub fn with_gain(mut self, gain: Gain) -> Self {
        self.gain = gain;
        self
    }

    /// Configuration register byte.
    pub fn to_byte(&self) -> u8 {
        (self.mux as u8) << 5
            | (self.gain as u8) << 4
            | (self.data_rate as u8) << 2
            | (self.conversion_mode as u8) << 1
            | self.reference.bit()
    }

    /// Volts represented by one code at this gain and reference.
    pub fn code_to_voltage(&self, raw: i16) -> f64 {
        self.reference.volts() * f64::from(raw) / FULL_SCALE_CODES / self.gain.factor()
    }
}

/// How long the driver keeps polling the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    max_attempts: u32,
}

impl PollPolicy {
    /// At least one status read is always made.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for PollPolicy {
    /// 10 ms between polls for up to one second. A 20 SPS conversion takes
    /// about 50 ms.
    fn default() -> Self {
        Self::new(Duration::from_millis(10), 100)
    }
}

/// Bus controller and 7-bit address of one converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAddress {
    pub bus: u8,
    pub address: u8,
}

impl BusAddress {
    pub const fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c-{}@0x{:02x}", self.bus, self.address)
    }
}

/// Result of one conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Signed conversion code
    pub raw_value: i16,
    /// Code scaled to volts at the converter input, unrounded
    pub voltage: f64,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}V (raw 0x{:04X})", self.voltage, self.raw_value as u16)
    }
}

/// Convert an SMBus data word into the signed conversion code.
///
/// The swap has to happen on the unsigned word; reinterpreting first would
/// take the sign from the low byte of the result.
pub fn decode_word(word: u16) -> i16 {
    word.swap_bytes() as i16
}

/// Inverse of [`decode_word`]: the SMBus word a device sending `raw` MSB
/// first produces.
pub fn encode_word(raw: i16) -> u16 {
    (raw as u16).swap_bytes()
}

#[derive(Debug, thiserror::Error)]
pub enum AdcError {
    #[error("bus transaction failed: {0}")]
    Bus(#[from] HwError),

    #[error("conversion not ready after {attempts} status polls")]
    Timeout { attempts: u32 },
}

/// ADS1119 driver
pub struct Ads1119<I: Smbus> {
    i2c: I,
    address: u8,
    config: Config,
    poll: PollPolicy,
}

impl<I: Smbus> Ads1119<I> {
    /// Create a driver using the default configuration and poll policy
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            config: Config::default(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one complete conversion and return the decoded sample.
    ///
    /// Every call starts from a reset, so a conversion abandoned by an
    /// earlier caller does not leak into this one.
    pub async fn read_voltage(&mut self) -> Result<Sample, AdcError> {
        trace!(address = self.address, "reset");
        self.send(Command::Reset).await?;

        let config = self.config.to_byte();
        trace!(address = self.address, "write config 0x{:02X}", config);
        self.i2c
            .write_byte_data(self.address, Command::WriteConfig.as_u8(), config)
            .await?;

        trace!(address = self.address, "start");
        self.send(Command::Start).await?;

        self.wait_ready().await?;

        let word = self
            .i2c
            .read_word_data(self.address, Command::ReadData.as_u8())
            .await?;
        let raw_value = decode_word(word);
        let voltage = self.config.code_to_voltage(raw_value);

        debug!(
            address = self.address,
            raw = %format_args!("0x{:04X}", raw_value as u16),
            "Read voltage={:.3}V",
            voltage
        );

        Ok(Sample { raw_value, voltage })
    }

    /// Read back the configuration register.
    pub async fn read_config(&mut self) -> Result<u8, AdcError> {
        let value = self
            .i2c
            .read_byte_data(self.address, Command::ReadConfig.as_u8())
            .await?;
        Ok(value)
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }

    async fn send(&mut self, command: Command) -> Result<(), AdcError> {
        self.i2c.write_byte(self.address, command.as_u8()).await?;
        Ok(())
    }

    async fn wait_ready(&mut self) -> Result<(), AdcError> {
        let mut attempts = 0;
        loop {
            let status = self
                .i2c
                .read_byte_data(self.address, Command::ReadStatus.as_u8())
                .await?;
            attempts += 1;

            if status & STATUS_READY != 0 {
                trace!(address = self.address, attempts, "result available");
                return Ok(());
            }
            if attempts >= self.poll.max_attempts {
                warn!(
                    address = self.address,
                    attempts, "No result available, giving up"
                );
                return Err(AdcError::Timeout { attempts });
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }
}

/// Open the bus, run one conversion with the default configuration, and
/// close the bus again.
pub async fn read_voltage(address: BusAddress, poll: PollPolicy) -> Result<Sample, AdcError> {
    read_voltage_with(address, Config::default(), poll).await
}

/// [`read_voltage`] with an explicit converter configuration.
///
/// A bus that cannot be opened is an [`AdcError::Bus`]; no sample is
/// produced for it.
pub async fn read_voltage_with(
    address: BusAddress,
    config: Config,
    poll: PollPolicy,
) -> Result<Sample, AdcError> {
    let bus = LinuxI2c::open(address.bus)?;
    Ads1119::new(bus, address.address)
        .with_config(config)
        .with_poll_policy(poll)
        .read_voltage()
        .await
}
