//! Station configuration.
//!
//! Everything is read from `POOL_SENSORS_*` environment variables so the
//! binary can be driven from a systemd unit or a cron line without a config
//! file. Unset variables fall back to the wiring of the reference board;
//! set-but-unparseable ones are an error.

use std::env;
use std::time::Duration;

use crate::peripheral::ads1119::{BusAddress, PollPolicy};
use crate::sensor::{orp, ph, CalibrationPoint, PhCalibration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// How the station identifies itself to Home Assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    /// Hardware id, conventionally the MAC address
    pub id: String,
    pub area: String,
}

impl DeviceConfig {
    /// Prefix for every sensor's `unique_id`, e.g. `b827eb771bbc_pool_controller_`.
    pub fn unique_id_prefix(&self) -> String {
        let id: String = self
            .id
            .chars()
            .filter(|c| *c != ':')
            .flat_map(char::to_lowercase)
            .collect();
        format!("{id}_pool_controller_")
    }

    /// MQTT client id, unique per station.
    pub fn client_id(&self) -> String {
        format!("{}pool_sensors", self.unique_id_prefix())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub i2c_bus: u8,
    pub ph_address: u8,
    pub orp_address: u8,
    pub poll: PollPolicy,
    pub ph_calibration: PhCalibration,
    pub w1_device: Option<String>,
    pub mqtt: MqttConfig,
    pub device: DeviceConfig,
    /// Time between value updates in `run` mode
    pub interval: Duration,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `POOL_SENSORS_I2C_BUS`: bus controller number (default: 1)
    /// - `POOL_SENSORS_PH_ADDRESS`, `POOL_SENSORS_ORP_ADDRESS`: converter
    ///   addresses, hex or decimal (default: 0x40, 0x45)
    /// - `POOL_SENSORS_ADC_MAX_POLLS`, `POOL_SENSORS_ADC_POLL_MS`: status
    ///   polling bound (default: 100 polls, 10 ms apart)
    /// - `POOL_SENSORS_PH_CAL_LOW`, `POOL_SENSORS_PH_CAL_HIGH`: two-point
    ///   calibration as `<ph>:<volts>` (default: theoretical slope)
    /// - `POOL_SENSORS_W1_DEVICE`: DS18B20 id (default: first found)
    /// - `POOL_SENSORS_MQTT_HOST`, `_PORT`, `_USER`, `_PASS`
    /// - `POOL_SENSORS_DEVICE_NAME`, `_ID`, `_AREA`
    /// - `POOL_SENSORS_INTERVAL_SECS`: publish interval (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PollPolicy::default();
        let poll = PollPolicy::new(
            Duration::from_millis(
                parse_var("POOL_SENSORS_ADC_POLL_MS", str::parse)?
                    .unwrap_or(defaults.interval().as_millis() as u64),
            ),
            parse_var("POOL_SENSORS_ADC_MAX_POLLS", str::parse)?
                .unwrap_or(defaults.max_attempts()),
        );

        let low = parse_var("POOL_SENSORS_PH_CAL_LOW", parse_calibration_point)?;
        let high = parse_var("POOL_SENSORS_PH_CAL_HIGH", parse_calibration_point)?;
        let ph_calibration = match (low, high) {
            (None, None) => PhCalibration::theoretical(),
            (Some(low), Some(high)) => PhCalibration::two_point(low, high).ok_or_else(|| {
                ConfigError::Invalid {
                    var: "POOL_SENSORS_PH_CAL_HIGH",
                    value: format!("{}:{}", high.ph, high.volts),
                    reason: "calibration points must differ in pH and voltage".into(),
                }
            })?,
            _ => {
                return Err(ConfigError::Incomplete(
                    "POOL_SENSORS_PH_CAL_LOW",
                    "POOL_SENSORS_PH_CAL_HIGH",
                ))
            }
        };

        let mqtt = MqttConfig {
            host: string_var("POOL_SENSORS_MQTT_HOST")
                .unwrap_or_else(|| "homeassistant.local".to_string()),
            port: parse_var("POOL_SENSORS_MQTT_PORT", str::parse)?.unwrap_or(1883),
            username: string_var("POOL_SENSORS_MQTT_USER"),
            password: string_var("POOL_SENSORS_MQTT_PASS"),
        };

        let device = DeviceConfig {
            name: string_var("POOL_SENSORS_DEVICE_NAME")
                .unwrap_or_else(|| "Raspberry Pi Zero-Pool".to_string()),
            id: string_var("POOL_SENSORS_DEVICE_ID")
                .unwrap_or_else(|| "b8:27:eb:77:1b:bc".to_string()),
            area: string_var("POOL_SENSORS_DEVICE_AREA").unwrap_or_else(|| "Pool".to_string()),
        };

        let interval_secs: u64 = parse_var("POOL_SENSORS_INTERVAL_SECS", str::parse)?.unwrap_or(60);
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "POOL_SENSORS_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least one second".into(),
            });
        }

        Ok(Self {
            i2c_bus: parse_var("POOL_SENSORS_I2C_BUS", parse_u8)?.unwrap_or(1),
            ph_address: parse_var("POOL_SENSORS_PH_ADDRESS", parse_address)?
                .unwrap_or(ph::DEFAULT_ADDRESS),
            orp_address: parse_var("POOL_SENSORS_ORP_ADDRESS", parse_address)?
                .unwrap_or(orp::DEFAULT_ADDRESS),
            poll,
            ph_calibration,
            w1_device: string_var("POOL_SENSORS_W1_DEVICE"),
            mqtt,
            device,
            interval: Duration::from_secs(interval_secs),
        })
    }

    pub fn ph_sensor(&self) -> ph::PhSensor {
        ph::PhSensor::new(BusAddress::new(self.i2c_bus, self.ph_address))
            .with_calibration(self.ph_calibration)
            .with_poll_policy(self.poll)
    }

    pub fn orp_sensor(&self) -> orp::OrpSensor {
        orp::OrpSensor::new(BusAddress::new(self.i2c_bus, self.orp_address))
            .with_poll_policy(self.poll)
    }

    pub fn temperature_sensor(&self) -> crate::sensor::TemperatureSensor {
        let sensor = crate::sensor::TemperatureSensor::new();
        match &self.w1_device {
            Some(id) => sensor.with_device_id(id.clone()),
            None => sensor,
        }
    }
}

fn string_var(var: &str) -> Option<String> {
    env::var(var).ok().filter(|s| !s.is_empty())
}

fn parse_var<T, E: ToString>(
    var: &'static str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = string_var(var) else {
        return Ok(None);
    };
    parse(value.trim())
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        })
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

/// A 7-bit I2C address, hex (`0x40`) or decimal (`64`).
pub fn parse_address(s: &str) -> Result<u8, String> {
    let addr = parse_u8(s)?;
    if addr > 0x7F {
        return Err(format!("0x{addr:02x} is not a 7-bit address"));
    }
    Ok(addr)
}

fn parse_calibration_point(s: &str) -> Result<CalibrationPoint, String> {
    let (ph, volts) = s
        .split_once(':')
        .ok_or_else(|| "expected <ph>:<volts>".to_string())?;
    let ph = ph.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let volts = volts.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(CalibrationPoint::new(ph, volts))
}
