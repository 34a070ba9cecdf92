//! Hardware abstraction layer traits.
//!
//! Peripheral drivers are written against these traits so they run the same
//! over a Linux `/dev/i2c-N` character device or over the scripted bus used
//! in tests.

pub mod i2c;
pub mod smbus;

#[cfg(test)]
pub(crate) mod mock;

// Re-export traits
pub use i2c::{I2c, I2cError};
pub use smbus::Smbus;

/// Common error type for hardware operations
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transaction-level failure reported by the bus controller
    #[error(transparent)]
    I2c(#[from] I2cError),
}

pub type Result<T> = std::result::Result<T, HwError>;
