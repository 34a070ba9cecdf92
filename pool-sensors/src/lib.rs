//! Pool water sensors for Home Assistant.
//!
//! Reads pH and oxidation-reduction potential through a pair of ADS1119
//! converters on the I2C bus and water temperature from a DS18B20 on
//! 1-Wire, then publishes the values over MQTT with Home Assistant
//! discovery.

pub mod config;
pub mod daemon;
pub mod home_assistant;
pub mod hw_trait;
pub mod peripheral;
pub mod sensor;
pub mod station;
pub mod tracing;
pub mod transport;
