//! Drivers for the I2C peripherals on the sensor board.

pub mod ads1119;
