//! pH probe reader.
//!
//! A glass electrode produces roughly -59.2 mV per pH unit around 0 V at
//! pH 7 (Nernst slope at 25 °C). The board amplifies it with a
//! non-inverting stage of gain `1 + 1 MΩ / 151 kΩ` before the converter.

use std::fmt;

use crate::hw_trait::Smbus;
use crate::peripheral::ads1119::{self, AdcError, Ads1119, BusAddress, PollPolicy, Sample};
use crate::tracing::prelude::*;

use super::{round_to, SensorError};

/// Default converter address for the pH channel
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Gain of the pH front end.
pub const OP_AMP_GAIN: f64 = 1.0 + 1.0e6 / 151.0e3;

/// Theoretical electrode slope in volts per pH unit.
pub const VOLTS_PER_PH: f64 = -0.0592;

/// pH at which an ideal electrode reads 0 V.
pub const NEUTRAL_PH: f64 = 7.0;

/// A buffer solution reading: its pH and the electrode voltage measured in
/// it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub ph: f64,
    pub volts: f64,
}

impl CalibrationPoint {
    pub const fn new(ph: f64, volts: f64) -> Self {
        Self { ph, volts }
    }
}

/// Linear electrode model: slope and the voltage read at pH 7.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhCalibration {
    volts_per_ph: f64,
    zero_offset: f64,
}

impl PhCalibration {
    /// Ideal electrode.
    pub const fn theoretical() -> Self {
        Self {
            volts_per_ph: VOLTS_PER_PH,
            zero_offset: 0.0,
        }
    }

    /// Fit a line through two buffer readings. Returns `None` when both
    /// points have the same pH or the same voltage.
    pub fn two_point(low: CalibrationPoint, high: CalibrationPoint) -> Option<Self> {
        let volts_per_ph = (high.volts - low.volts) / (high.ph - low.ph);
        if !volts_per_ph.is_finite() || volts_per_ph == 0.0 {
            return None;
        }
        let zero_offset = (NEUTRAL_PH - low.ph) * volts_per_ph + low.volts;
        Some(Self {
            volts_per_ph,
            zero_offset,
        })
    }

    pub fn volts_per_ph(&self) -> f64 {
        self.volts_per_ph
    }

    pub fn zero_offset(&self) -> f64 {
        self.zero_offset
    }

    /// pH for an electrode voltage.
    pub fn ph(&self, volts: f64) -> f64 {
        NEUTRAL_PH + (volts - self.zero_offset) / self.volts_per_ph
    }
}

impl Default for PhCalibration {
    fn default() -> Self {
        Self::theoretical()
    }
}

/// One pH reading, kept at full precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhMeasurement {
    pub ph: f64,
    /// Electrode voltage with the front-end gain divided out
    pub input_voltage: f64,
    pub sample: Sample,
}

impl PhMeasurement {
    pub fn from_sample(sample: Sample, calibration: &PhCalibration) -> Self {
        let input_voltage = sample.voltage / OP_AMP_GAIN;
        let ph = calibration.ph(input_voltage);
        Self {
            ph,
            input_voltage,
            sample,
        }
    }

    /// pH to two decimals
    pub fn ph_rounded(&self) -> f64 {
        round_to(self.ph, 2)
    }

    /// Electrode voltage to millivolt resolution
    pub fn input_voltage_rounded(&self) -> f64 {
        round_to(self.input_voltage, 3)
    }
}

impl fmt::Display for PhMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pH {:.2}, voltage={:.3}V, raw_value=0x{:04X}",
            self.ph, self.input_voltage, self.sample.raw_value as u16
        )
    }
}

/// pH channel: where its converter lives and how to interpret it.
#[derive(Debug, Clone)]
pub struct PhSensor {
    address: BusAddress,
    calibration: PhCalibration,
    poll: PollPolicy,
}

impl PhSensor {
    pub fn new(address: BusAddress) -> Self {
        Self {
            address,
            calibration: PhCalibration::theoretical(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_calibration(mut self, calibration: PhCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Take a reading through an already open bus.
    pub async fn read_from<I: Smbus>(&self, i2c: I) -> Result<PhMeasurement, SensorError> {
        let sample = Ads1119::new(i2c, self.address.address)
            .with_poll_policy(self.poll)
            .read_voltage()
            .await;
        self.measure(sample)
    }

    /// Open the configured bus for the duration of one reading.
    pub async fn read(&self) -> Result<PhMeasurement, SensorError> {
        let sample = ads1119::read_voltage(self.address, self.poll).await;
        self.measure(sample)
    }

    fn measure(&self, sample: Result<Sample, AdcError>) -> Result<PhMeasurement, SensorError> {
        let sample = sample.map_err(|source| SensorError::Adc {
            sensor: "pH",
            address: self.address,
            source,
        })?;

        let measurement = PhMeasurement::from_sample(sample, &self.calibration);
        info!("Read {}", measurement);
        Ok(measurement)
    }
}
