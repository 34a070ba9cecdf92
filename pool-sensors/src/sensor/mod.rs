//! Measurement readers.
//!
//! The pH and ORP probes sit behind op-amp front ends feeding an ADS1119
//! each; a reader takes one [`Sample`] from its converter, divides out the
//! front-end gain and applies the probe's scaling. Values keep full
//! precision; rounding happens only when a measurement is presented.
//!
//! [`Sample`]: crate::peripheral::ads1119::Sample

pub mod orp;
pub mod ph;
pub mod temperature;

pub use orp::{OrpMeasurement, OrpSensor};
pub use ph::{CalibrationPoint, PhCalibration, PhMeasurement, PhSensor};
pub use temperature::{TemperatureError, TemperatureMeasurement, TemperatureSensor};

use crate::peripheral::ads1119::{AdcError, BusAddress};

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("{sensor} converter at {address}: {source}")]
    Adc {
        sensor: &'static str,
        address: BusAddress,
        #[source]
        source: AdcError,
    },

    #[error("temperature sensor: {0}")]
    Temperature(#[from] TemperatureError),
}

/// Round `value` to a fixed number of decimal places for display.
///
/// Goes through the decimal string form so the result is the double closest
/// to what gets printed.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    format!("{value:.decimals$}").parse().unwrap_or(value)
}
