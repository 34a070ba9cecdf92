//! Concrete bus transports.

pub mod linux;

pub use linux::{bus_path, LinuxI2c};
