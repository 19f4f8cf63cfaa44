//! Device transport abstraction
//!
//! A device moves raw bytes to and from SI hardware. The station layer only
//! depends on the [`SiDevice`] trait, so serial hardware and in-process
//! test doubles are interchangeable.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod serial;

#[cfg(test)]
pub(crate) mod fake;

pub use serial::SerialSiDevice;

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceState {
    /// Not yet opened, or closed again
    Closed,
    /// Open in progress
    Opening,
    /// Ready for traffic
    Opened,
    /// Failed and unusable
    Errored,
}

/// Errors from device transport operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Underlying serial port failure
    #[error("serial port error: {0}")]
    Serial(String),

    /// Operation on a device that is not open
    #[error("device is not open")]
    NotOpen,

    /// I/O failure while reading or writing
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte transport to a single piece of SI hardware
#[async_trait]
pub trait SiDevice: Send + Sync {
    /// Stable identifier for logging, such as the port path
    fn ident(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> DeviceState;

    /// Subscribe to bytes received from the hardware
    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>>;

    /// Write bytes to the hardware
    async fn send(&self, data: &[u8]) -> Result<(), DeviceError>;
}
