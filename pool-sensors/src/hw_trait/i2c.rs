//! Raw I2C transfers.
//!
//! Everything above this trait speaks in command codes (see
//! [`Smbus`](super::Smbus)); implementations only move bytes to and from a
//! 7-bit address.

use async_trait::async_trait;
use super::Result;

/// Failures reported by the bus controller for a single transfer.
#[derive(Debug, thiserror::Error)]
pub enum I2cError {
    /// Address or data byte was not acknowledged, usually a missing or
    /// misaddressed converter
    #[error("no ACK from 0x{0:02x}")]
    NoAck(u8),

    #[error("arbitration lost")]
    ArbitrationLost,

    /// Electrical fault on SDA/SCL
    #[error("bus fault")]
    BusError,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait I2c: Send + Sync {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write then read with a repeated start, so no other master can take
    /// the bus between the command byte and the reply.
    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()>;
}

// A driver can then borrow a bus for one conversion instead of owning it.
#[async_trait]
impl<T: I2c + ?Sized> I2c for &mut T {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        (**self).write(addr, data).await
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        (**self).read(addr, buffer).await
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        (**self).write_read(addr, write, read).await
    }
}
