//! Home Assistant MQTT integration.
//!
//! Each sensor gets a retained discovery message under
//! `homeassistant/sensor/<name>/config` describing where its state lives,
//! and publishes that state as a JSON object on `tele/<name>/status`.

pub mod mqtt;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::config::DeviceConfig;
use crate::sensor::{OrpMeasurement, PhMeasurement, TemperatureMeasurement};
use crate::tracing::prelude::*;

pub use mqtt::MqttPublisher;

pub const PH_SENSOR: &str = "pool_ph";
pub const ORP_SENSOR: &str = "pool_orp";
pub const TEMPERATURE_SENSOR: &str = "pool_temp";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The broker connection did not flush queued messages before the
    /// deadline; they were dropped.
    #[error("queued MQTT messages not delivered within {0:?}")]
    NotDelivered(std::time::Duration),
}

/// Delivery guarantees for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// QoS 1 and retained, so Home Assistant sees it after a restart
    Retained,
    /// QoS 0, superseded by the next update anyway
    Transient,
}

/// Sink for outgoing messages.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(
        &mut self,
        topic: &str,
        payload: String,
        delivery: Delivery,
    ) -> Result<(), PublishError>;
}

pub fn discovery_topic(sensor: &str) -> String {
    format!("homeassistant/sensor/{sensor}/config")
}

pub fn status_topic(sensor: &str) -> String {
    format!("tele/{sensor}/status")
}

#[derive(Debug, Clone, Serialize)]
struct DeviceInfo<'a> {
    name: &'a str,
    ids: [&'a str; 1],
    suggested_area: &'a str,
}

/// Sensor discovery payload.
#[derive(Debug, Clone, Serialize)]
pub struct Discovery<'a> {
    name: &'a str,
    state_topic: String,
    value_template: String,
    json_attributes_topic: String,
    unique_id: String,
    dev: DeviceInfo<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'a str>,
}

impl<'a> Discovery<'a> {
    pub fn new(
        device: &'a DeviceConfig,
        sensor: &'a str,
        value_field: &str,
        unit_of_measurement: Option<&'a str>,
        device_class: Option<&'a str>,
    ) -> Self {
        Self {
            name: sensor,
            state_topic: status_topic(sensor),
            value_template: format!("{{{{ value_json.{value_field} }}}}"),
            json_attributes_topic: status_topic(sensor),
            unique_id: format!("{}{}", device.unique_id_prefix(), sensor),
            dev: DeviceInfo {
                name: &device.name,
                ids: [device.id.as_str()],
                suggested_area: &device.area,
            },
            unit_of_measurement,
            device_class,
        }
    }
}

/// Discovery messages for the three pool sensors.
pub fn discoveries(device: &DeviceConfig) -> [Discovery<'_>; 3] {
    [
        Discovery::new(device, PH_SENSOR, "ph", None, None),
        Discovery::new(device, ORP_SENSOR, "orp", Some("mV"), None),
        Discovery::new(
            device,
            TEMPERATURE_SENSOR,
            "temperature",
            Some("°C"),
            Some("temperature"),
        ),
    ]
}

/// Write a rounded reading without a trailing `.0`, so pH 7.00 goes out
/// as `7` and 7.10 as `7.1`.
fn decimal<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    // Beyond 2^53 not every integer is representable
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() < EXACT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhStatus {
    #[serde(serialize_with = "decimal")]
    pub ph: f64,
    #[serde(serialize_with = "decimal")]
    pub voltage: f64,
    pub raw_value: i16,
}

impl From<&PhMeasurement> for PhStatus {
    fn from(m: &PhMeasurement) -> Self {
        Self {
            ph: m.ph_rounded(),
            voltage: m.input_voltage_rounded(),
            raw_value: m.sample.raw_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrpStatus {
    pub orp: i32,
    pub raw_value: i16,
}

impl From<&OrpMeasurement> for OrpStatus {
    fn from(m: &OrpMeasurement) -> Self {
        Self {
            orp: m.millivolts,
            raw_value: m.sample.raw_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureStatus {
    #[serde(serialize_with = "decimal")]
    pub temperature: f64,
}

impl From<&TemperatureMeasurement> for TemperatureStatus {
    fn from(m: &TemperatureMeasurement) -> Self {
        Self {
            temperature: m.celsius_rounded(),
        }
    }
}

/// Publish (or refresh) discovery for every sensor.
pub async fn publish_discovery<P: Publisher + ?Sized>(
    publisher: &mut P,
    device: &DeviceConfig,
) -> Result<(), PublishError> {
    for discovery in discoveries(device) {
        let topic = discovery_topic(discovery.name);
        let message = serde_json::to_string(&discovery)?;
        info!(topic = %topic, message = %message, "Sending discovery");
        publisher.publish(&topic, message, Delivery::Retained).await?;
    }
    Ok(())
}

/// Publish one sensor's current state.
pub async fn publish_status<P: Publisher + ?Sized, S: Serialize + Sync>(
    publisher: &mut P,
    sensor: &str,
    status: &S,
) -> Result<(), PublishError> {
    let topic = status_topic(sensor);
    let message = serde_json::to_string(status)?;
    info!(topic = %topic, message = %message, "Sending status");
    publisher.publish(&topic, message, Delivery::Transient).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::ads1119::Sample;
    use crate::sensor::PhCalibration;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct RecordingPublisher {
        messages: Vec<(String, String, Delivery)>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &mut self,
            topic: &str,
            payload: String,
            delivery: Delivery,
        ) -> Result<(), PublishError> {
            self.messages.push((topic.to_string(), payload, delivery));
            Ok(())
        }
    }

    fn device() -> DeviceConfig {
        DeviceConfig {
            name: "Raspberry Pi Zero-Pool".into(),
            id: "b8:27:eb:77:1b:bc".into(),
            area: "Pool".into(),
        }
    }

    #[test]
    fn test_topics() {
        assert_eq!(discovery_topic("pool_ph"), "homeassistant/sensor/pool_ph/config");
        assert_eq!(status_topic("pool_orp"), "tele/pool_orp/status");
    }

    #[test]
    fn test_discovery_message() {
        let device = device();
        let message = serde_json::to_value(Discovery::new(
            &device,
            TEMPERATURE_SENSOR,
            "temperature",
            Some("°C"),
            Some("temperature"),
        ))
        .unwrap();

        assert_eq!(
            message,
            json!({
                "name": "pool_temp",
                "state_topic": "tele/pool_temp/status",
                "value_template": "{{ value_json.temperature }}",
                "json_attributes_topic": "tele/pool_temp/status",
                "unique_id": "b827eb771bbc_pool_controller_pool_temp",
                "dev": {
                    "name": "Raspberry Pi Zero-Pool",
                    "ids": ["b8:27:eb:77:1b:bc"],
                    "suggested_area": "Pool"
                },
                "unit_of_measurement": "°C",
                "device_class": "temperature"
            })
        );
    }

    #[test]
    fn test_optional_fields_omitted() {
        let device = device();
        let message =
            serde_json::to_value(Discovery::new(&device, PH_SENSOR, "ph", None, None)).unwrap();

        let object = message.as_object().unwrap();
        assert!(!object.contains_key("unit_of_measurement"));
        assert!(!object.contains_key("device_class"));
    }

    #[test]
    fn test_ph_status_is_rounded() {
        let m = PhMeasurement::from_sample(
            Sample {
                raw_value: i16::MIN,
                voltage: -2.048,
            },
            &PhCalibration::theoretical(),
        );
        let status: Value = serde_json::to_value(PhStatus::from(&m)).unwrap();

        assert_eq!(status, json!({"ph": 11.54, "voltage": -0.269, "raw_value": -32768}));
    }

    #[test]
    fn test_whole_values_have_no_trailing_zero() {
        let m = PhMeasurement::from_sample(
            Sample {
                raw_value: 0,
                voltage: 0.0,
            },
            &PhCalibration::theoretical(),
        );
        assert_eq!(
            serde_json::to_string(&PhStatus::from(&m)).unwrap(),
            r#"{"ph":7,"voltage":0,"raw_value":0}"#
        );

        let status = TemperatureStatus { temperature: 30.0 };
        assert_eq!(serde_json::to_string(&status).unwrap(), r#"{"temperature":30}"#);

        let status = TemperatureStatus { temperature: 21.5 };
        assert_eq!(serde_json::to_string(&status).unwrap(), r#"{"temperature":21.5}"#);
    }

    #[tokio::test]
    async fn test_publish_discovery() {
        let mut publisher = RecordingPublisher::default();
        publish_discovery(&mut publisher, &device()).await.unwrap();

        let topics: Vec<_> = publisher.messages.iter().map(|(t, _, _)| t.as_str()).collect();
        assert_eq!(
            topics,
            [
                "homeassistant/sensor/pool_ph/config",
                "homeassistant/sensor/pool_orp/config",
                "homeassistant/sensor/pool_temp/config",
            ]
        );
        assert!(publisher
            .messages
            .iter()
            .all(|(_, _, delivery)| *delivery == Delivery::Retained));
    }

    #[tokio::test]
    async fn test_publish_status() {
        let mut publisher = RecordingPublisher::default();
        let status = OrpStatus {
            orp: 650,
            raw_value: 0x3A00,
        };
        publish_status(&mut publisher, ORP_SENSOR, &status).await.unwrap();

        assert_eq!(
            publisher.messages,
            [(
                "tele/pool_orp/status".to_string(),
                r#"{"orp":650,"raw_value":14848}"#.to_string(),
                Delivery::Transient,
            )]
        );
    }
}
