//! SMBus command primitives layered over raw I2C transfers.
//!
//! These mirror the Linux `i2c_smbus_*` calls. The one detail drivers must
//! keep in mind is that SMBus words travel low byte first, so
//! [`Smbus::read_word_data`] assembles the two received bytes as a
//! little-endian `u16` regardless of how the device itself orders them.

use async_trait::async_trait;

use super::{I2c, Result};

#[async_trait]
pub trait Smbus: I2c {
    /// Send a single command byte.
    async fn write_byte(&mut self, addr: u8, command: u8) -> Result<()> {
        self.write(addr, &[command]).await
    }

    /// Send a command byte followed by one data byte.
    async fn write_byte_data(&mut self, addr: u8, command: u8, value: u8) -> Result<()> {
        self.write(addr, &[command, value]).await
    }

    /// Send a command byte, then read one byte back.
    async fn read_byte_data(&mut self, addr: u8, command: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.write_read(addr, &[command], &mut buf).await?;
        Ok(buf[0])
    }

    /// Send a command byte, then read a 16-bit word (first byte received is
    /// the low byte).
    async fn read_word_data(&mut self, addr: u8, command: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.write_read(addr, &[command], &mut buf).await?;
        Ok(u16::from_le_bytes(buf))
    }
}

impl<T: I2c + ?Sized> Smbus for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::mock::{BusOp, ScriptedI2c};

    #[tokio::test]
    async fn test_word_is_assembled_low_byte_first() {
        let mut bus = ScriptedI2c::new();
        bus.queue_read(&[0x34, 0x12]);

        let word = bus.read_word_data(0x40, 0x10).await.unwrap();

        assert_eq!(word, 0x1234);
        assert_eq!(bus.ops(), &[BusOp::WriteRead(0x40, vec![0x10], 2)]);
    }

    #[tokio::test]
    async fn test_command_framing() {
        let mut bus = ScriptedI2c::new();
        bus.write_byte(0x45, 0x06).await.unwrap();
        bus.write_byte_data(0x45, 0x40, 0x21).await.unwrap();

        assert_eq!(
            bus.ops(),
            &[
                BusOp::Write(0x45, vec![0x06]),
                BusOp::Write(0x45, vec![0x40, 0x21]),
            ]
        );
    }
}
