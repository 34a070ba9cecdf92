//! Oxidation-reduction potential probe reader.
//!
//! The ORP electrode voltage is reported directly in millivolts. Its front
//! end has gain `1 + 200 kΩ / 151 kΩ`.

use std::fmt;

use crate::hw_trait::Smbus;
use crate::peripheral::ads1119::{self, AdcError, Ads1119, BusAddress, PollPolicy, Sample};
use crate::tracing::prelude::*;

use super::SensorError;

/// Default converter address for the ORP channel
pub const DEFAULT_ADDRESS: u8 = 0x45;

/// Gain of the ORP front end.
pub const OP_AMP_GAIN: f64 = 1.0 + 200.0e3 / 151.0e3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrpMeasurement {
    /// Whole millivolts, truncated toward zero
    pub millivolts: i32,
    pub input_voltage: f64,
    pub sample: Sample,
}

impl OrpMeasurement {
    pub fn from_sample(sample: Sample) -> Self {
        let input_voltage = sample.voltage / OP_AMP_GAIN;
        Self {
            millivolts: (input_voltage * 1000.0).trunc() as i32,
            input_voltage,
            sample,
        }
    }
}

impl fmt::Display for OrpMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ORP {}mV, raw_value=0x{:04X}",
            self.millivolts, self.sample.raw_value as u16
        )
    }
}

#[derive(Debug, Clone)]
pub struct OrpSensor {
    address: BusAddress,
    poll: PollPolicy,
}

impl OrpSensor {
    pub fn new(address: BusAddress) -> Self {
        Self {
            address,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Take a reading through an already open bus.
    pub async fn read_from<I: Smbus>(&self, i2c: I) -> Result<OrpMeasurement, SensorError> {
        let sample = Ads1119::new(i2c, self.address.address)
            .with_poll_policy(self.poll)
            .read_voltage()
            .await;
        self.measure(sample)
    }

    /// Open the configured bus for the duration of one reading.
    pub async fn read(&self) -> Result<OrpMeasurement, SensorError> {
        let sample = ads1119::read_voltage(self.address, self.poll).await;
        self.measure(sample)
    }

    fn measure(&self, sample: Result<Sample, AdcError>) -> Result<OrpMeasurement, SensorError> {
        let sample = sample.map_err(|source| SensorError::Adc {
            sensor: "ORP",
            address: self.address,
            source,
        })?;

        let measurement = OrpMeasurement::from_sample(sample);
        info!("Read {}", measurement);
        Ok(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::mock::{BusOp, ScriptedI2c};
    use crate::hw_trait::HwError;

    fn sample(voltage: f64) -> Sample {
        Sample {
            raw_value: 0,
            voltage,
        }
    }

    #[test]
    fn test_half_volt() {
        assert!((OP_AMP_GAIN - 2.3245).abs() < 1e-4);

        let m = OrpMeasurement::from_sample(sample(0.5));
        assert!((m.input_voltage - 0.2151).abs() < 1e-4);
        assert_eq!(m.millivolts, 215);
    }

    #[test]
    fn test_millivolts_truncate() {
        // 215.9 mV at the electrode reports 215, not 216
        let m = OrpMeasurement::from_sample(sample(0.2159 * OP_AMP_GAIN));
        assert_eq!(m.millivolts, 215);

        // Toward zero for negative potentials too
        let m = OrpMeasurement::from_sample(sample(-0.2159 * OP_AMP_GAIN));
        assert_eq!(m.millivolts, -215);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_from_bus() {
        let mut bus = ScriptedI2c::new();
        bus.queue_read(&[0x00]); // busy
        bus.queue_read(&[0x80]); // ready
        bus.queue_read(&[0x10, 0x00]); // 0x1000 = 0.256 V

        let sensor = OrpSensor::new(BusAddress::new(1, DEFAULT_ADDRESS));
        let m = sensor.read_from(&mut bus).await.unwrap();

        assert_eq!(m.sample.raw_value, 0x1000);
        assert_eq!(m.millivolts, 110);
        assert_eq!(
            bus.ops(),
            &[
                BusOp::Write(0x45, vec![0x06]),
                BusOp::Write(0x45, vec![0x40, 0x00]),
                BusOp::Write(0x45, vec![0x08]),
                BusOp::WriteRead(0x45, vec![0x24], 1),
                BusOp::WriteRead(0x45, vec![0x24], 1),
                BusOp::WriteRead(0x45, vec![0x10], 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_bus_is_reported_not_zeroed() {
        let sensor = OrpSensor::new(BusAddress::new(250, DEFAULT_ADDRESS));

        let err = sensor.read().await.unwrap_err();

        assert!(matches!(
            err,
            SensorError::Adc {
                sensor: "ORP",
                source: AdcError::Bus(HwError::Io(_)),
                ..
            }
        ));
    }
}
