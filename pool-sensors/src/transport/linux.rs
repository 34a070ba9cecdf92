//! Linux `i2c-dev` bus.
//!
//! Wraps the blocking `linux-embedded-hal` character device. Transfers on
//! the sensor boards are a handful of bytes at 100 kHz, so they run inline
//! on the calling task rather than being shipped to a blocking pool.

use std::path::PathBuf;

use async_trait::async_trait;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c as _};
use linux_embedded_hal::I2cdev;

use crate::hw_trait::{HwError, I2c, I2cError, Result};
use crate::tracing::prelude::*;

/// Device node for a numbered bus controller, e.g. `/dev/i2c-1`.
pub fn bus_path(bus: u8) -> PathBuf {
    PathBuf::from(format!("/dev/i2c-{bus}"))
}

/// An open `/dev/i2c-N` handle.
pub struct LinuxI2c {
    dev: I2cdev,
}

impl LinuxI2c {
    /// Open the numbered bus controller.
    pub fn open(bus: u8) -> Result<Self> {
        let path = bus_path(bus);
        let dev = I2cdev::new(&path).map_err(|e| {
            HwError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("failed to open {}: {}", path.display(), e),
            ))
        })?;
        trace!(bus, "Opened I2C bus");
        Ok(Self { dev })
    }
}

fn map_error<E: embedded_hal::i2c::Error + std::fmt::Display>(addr: u8, err: E) -> HwError {
    let err = match err.kind() {
        ErrorKind::NoAcknowledge(_) => I2cError::NoAck(addr),
        ErrorKind::ArbitrationLoss => I2cError::ArbitrationLost,
        ErrorKind::Bus => I2cError::BusError,
        _ => I2cError::Other(err.to_string()),
    };
    HwError::I2c(err)
}

#[async_trait]
impl I2c for LinuxI2c {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.dev.write(addr, data).map_err(|e| map_error(addr, e))
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        self.dev.read(addr, buffer).map_err(|e| map_error(addr, e))
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.dev
            .write_read(addr, write, read)
            .map_err(|e| map_error(addr, e))
    }
}
