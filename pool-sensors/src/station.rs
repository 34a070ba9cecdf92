//! One round of readings across every sensor on the station.
//!
//! Sensors are read one after another, each with the bus opened just for
//! its own transaction. A failed sensor is logged and left out of the
//! round; its last good value stays on the broker rather than being
//! replaced by a made-up one.

use crate::config::Config;
use crate::home_assistant::{
    self, OrpStatus, PhStatus, PublishError, Publisher, TemperatureStatus,
};
use crate::sensor::{OrpMeasurement, PhMeasurement, SensorError, TemperatureMeasurement};
use crate::tracing::prelude::*;

#[derive(Debug)]
pub struct Readings {
    pub ph: Result<PhMeasurement, SensorError>,
    pub orp: Result<OrpMeasurement, SensorError>,
    pub temperature: Result<TemperatureMeasurement, SensorError>,
}

impl Readings {
    /// Number of sensors that failed to produce a value.
    pub fn failures(&self) -> usize {
        [
            self.ph.is_err(),
            self.orp.is_err(),
            self.temperature.is_err(),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count()
    }
}

pub async fn read_all(config: &Config) -> Readings {
    let ph = config.ph_sensor().read().await;
    let orp = config.orp_sensor().read().await;
    let temperature = config
        .temperature_sensor()
        .read()
        .await
        .map_err(SensorError::from);

    let readings = Readings {
        ph,
        orp,
        temperature,
    };
    log_failures(&readings);
    readings
}

fn log_failures(readings: &Readings) {
    let errors = [
        readings.ph.as_ref().err(),
        readings.orp.as_ref().err(),
        readings.temperature.as_ref().err(),
    ];
    for e in errors.into_iter().flatten() {
        error!("Sensor read failed: {}", e);
    }
}

/// Publish every successful reading. Returns how many were published.
pub async fn publish_readings<P: Publisher + ?Sized>(
    publisher: &mut P,
    readings: &Readings,
) -> Result<usize, PublishError> {
    let mut published = 0;

    if let Ok(m) = &readings.ph {
        home_assistant::publish_status(publisher, home_assistant::PH_SENSOR, &PhStatus::from(m))
            .await?;
        published += 1;
    }
    if let Ok(m) = &readings.orp {
        home_assistant::publish_status(publisher, home_assistant::ORP_SENSOR, &OrpStatus::from(m))
            .await?;
        published += 1;
    }
    if let Ok(m) = &readings.temperature {
        home_assistant::publish_status(
            publisher,
            home_assistant::TEMPERATURE_SENSOR,
            &TemperatureStatus::from(m),
        )
        .await?;
        published += 1;
    }

    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::home_assistant::Delivery;
    use crate::peripheral::ads1119::{AdcError, BusAddress, Sample};
    use crate::sensor::{PhCalibration, TemperatureError};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingPublisher {
        topics: Vec<String>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &mut self,
            topic: &str,
            _payload: String,
            _delivery: Delivery,
        ) -> Result<(), PublishError> {
            self.topics.push(topic.to_string());
            Ok(())
        }
    }

    fn ph() -> PhMeasurement {
        PhMeasurement::from_sample(
            Sample {
                raw_value: 100,
                voltage: 0.00625,
            },
            &PhCalibration::theoretical(),
        )
    }

    #[tokio::test]
    async fn test_failed_sensor_is_skipped() {
        let readings = Readings {
            ph: Ok(ph()),
            orp: Err(SensorError::Adc {
                sensor: "ORP",
                address: BusAddress::new(1, 0x45),
                source: AdcError::Timeout { attempts: 100 },
            }),
            temperature: Err(SensorError::Temperature(TemperatureError::PowerOnReset)),
        };
        assert_eq!(readings.failures(), 2);

        let mut publisher = RecordingPublisher::default();
        let published = publish_readings(&mut publisher, &readings).await.unwrap();

        assert_eq!(published, 1);
        assert_eq!(publisher.topics, ["tele/pool_ph/status"]);
    }

    #[tokio::test]
    async fn test_all_sensors_published_in_order() {
        let readings = Readings {
            ph: Ok(ph()),
            orp: Ok(OrpMeasurement::from_sample(Sample {
                raw_value: 100,
                voltage: 0.00625,
            })),
            temperature: Ok(TemperatureMeasurement { celsius: 26.5 }),
        };

        let mut publisher = RecordingPublisher::default();
        publish_readings(&mut publisher, &readings).await.unwrap();

        assert_eq!(
            publisher.topics,
            [
                "tele/pool_ph/status",
                "tele/pool_orp/status",
                "tele/pool_temp/status"
            ]
        );
    }
}
