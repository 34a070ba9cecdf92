//! DS18B20 water temperature via the kernel 1-Wire driver.
//!
//! With `w1-gpio` and `w1-therm` loaded, every probe appears as
//! `/sys/bus/w1/devices/28-<serial>/w1_slave`. Reading that file triggers a
//! conversion and returns two lines of scratchpad hex; the first ends in the
//! CRC verdict, the second in `t=<millidegrees>`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::tracing::prelude::*;

use super::round_to;

pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// 1-Wire family code prefix of the DS18B20
const DS18B20_FAMILY: &str = "28-";

/// Scratchpad value right after power-up, before any conversion ran.
const POWER_ON_RESET_MILLIDEGREES: i32 = 85_000;

#[derive(Debug, thiserror::Error)]
pub enum TemperatureError {
    #[error("no DS18B20 found under {0}")]
    NoSensor(PathBuf),

    #[error("CRC check failed: {0:?}")]
    CrcMismatch(String),

    #[error("sensor returned its power-on reset value")]
    PowerOnReset,

    #[error("unexpected w1_slave contents: {0:?}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureMeasurement {
    pub celsius: f64,
}

impl TemperatureMeasurement {
    /// Temperature to 0.1 °C
    pub fn celsius_rounded(&self) -> f64 {
        round_to(self.celsius, 1)
    }
}

impl fmt::Display for TemperatureMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "temp {:.1}", self.celsius)
    }
}

/// Parse the contents of a `w1_slave` file into degrees Celsius.
pub fn parse_w1_slave(contents: &str) -> Result<f64, TemperatureError> {
    let mut lines = contents.lines();
    let (Some(crc_line), Some(data_line)) = (lines.next(), lines.next()) else {
        return Err(TemperatureError::Malformed(contents.to_string()));
    };

    if !crc_line.trim_end().ends_with("YES") {
        return Err(TemperatureError::CrcMismatch(crc_line.to_string()));
    }

    let millidegrees: i32 = data_line
        .rsplit_once("t=")
        .and_then(|(_, value)| value.trim().parse().ok())
        .ok_or_else(|| TemperatureError::Malformed(data_line.to_string()))?;

    if millidegrees == POWER_ON_RESET_MILLIDEGREES {
        return Err(TemperatureError::PowerOnReset);
    }

    Ok(f64::from(millidegrees) / 1000.0)
}

#[derive(Debug, Clone)]
pub struct TemperatureSensor {
    devices_dir: PathBuf,
    device_id: Option<String>,
}

impl TemperatureSensor {
    /// Use the first DS18B20 the kernel knows about.
    pub fn new() -> Self {
        Self {
            devices_dir: PathBuf::from(W1_DEVICES_DIR),
            device_id: None,
        }
    }

    /// Use a specific probe, e.g. `28-0316a2794aff`.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Look for devices somewhere other than sysfs.
    pub fn with_devices_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.devices_dir = dir.into();
        self
    }

    pub async fn read(&self) -> Result<TemperatureMeasurement, TemperatureError> {
        let device = self.device_dir().await?;
        let contents = tokio::fs::read_to_string(device.join("w1_slave")).await?;
        let celsius = parse_w1_slave(&contents)?;

        let measurement = TemperatureMeasurement { celsius };
        info!("Read {}", measurement);
        Ok(measurement)
    }

    async fn device_dir(&self) -> Result<PathBuf, TemperatureError> {
        if let Some(id) = &self.device_id {
            return Ok(self.devices_dir.join(id));
        }
        first_ds18b20(&self.devices_dir)
            .await?
            .ok_or_else(|| TemperatureError::NoSensor(self.devices_dir.clone()))
    }
}

impl Default for TemperatureSensor {
    fn default() -> Self {
        Self::new()
    }
}

// Sorted so the choice is stable when several probes are attached.
async fn first_ds18b20(dir: &Path) -> Result<Option<PathBuf>, TemperatureError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(DS18B20_FAMILY)
        {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    if candidates.len() > 1 {
        debug!(count = candidates.len(), "Several DS18B20 probes, using the first");
    }
    Ok(candidates.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pool-sensors-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse_w1_slave(GOOD).unwrap(), 23.125);
    }

    #[test]
    fn test_parse_below_freezing() {
        let contents = "ec ff 4b 46 7f ff 0c 10 c6 : crc=c6 YES\n\
                        ec ff 4b 46 7f ff 0c 10 c6 t=-1250\n";
        assert_eq!(parse_w1_slave(contents).unwrap(), -1.25);
    }

    #[test]
    fn test_parse_crc_failure() {
        let contents = "72 01 4b 46 7f ff 0e 10 57 : crc=12 NO\n\
                        72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert!(matches!(
            parse_w1_slave(contents),
            Err(TemperatureError::CrcMismatch(_))
        ));
    }

    #[test]
    fn test_parse_power_on_value() {
        let contents = "50 05 4b 46 7f ff 0c 10 1c : crc=1c YES\n\
                        50 05 4b 46 7f ff 0c 10 1c t=85000\n";
        assert!(matches!(
            parse_w1_slave(contents),
            Err(TemperatureError::PowerOnReset)
        ));
    }

    #[test]
    fn test_parse_truncated() {
        assert!(matches!(
            parse_w1_slave("72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n"),
            Err(TemperatureError::Malformed(_))
        ));
        assert!(matches!(
            parse_w1_slave("a YES\nb t=\n"),
            Err(TemperatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_rounding() {
        let m = TemperatureMeasurement { celsius: 23.187 };
        assert_eq!(m.celsius_rounded(), 23.2);
        assert_eq!(m.to_string(), "temp 23.2");
    }

    #[tokio::test]
    async fn test_reads_first_probe() {
        let dir = scratch_dir("w1-first");
        std::fs::create_dir_all(dir.join("w1_bus_master1")).unwrap();
        for (id, t) in [("28-00000b", 30000), ("28-00000a", 21500)] {
            let device = dir.join(id);
            std::fs::create_dir_all(&device).unwrap();
            std::fs::write(
                device.join("w1_slave"),
                format!("00 : crc=00 YES\n00 t={t}\n"),
            )
            .unwrap();
        }

        let sensor = TemperatureSensor::new().with_devices_dir(&dir);
        assert_eq!(sensor.read().await.unwrap().celsius, 21.5);

        let sensor = sensor.with_device_id("28-00000b");
        assert_eq!(sensor.read().await.unwrap().celsius, 30.0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_probe() {
        let dir = scratch_dir("w1-empty");
        let sensor = TemperatureSensor::new().with_devices_dir(&dir);

        assert!(matches!(
            sensor.read().await,
            Err(TemperatureError::NoSensor(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
