//! Error types for picoflash.

use std::io;
use thiserror::Error;

/// Result type for picoflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for picoflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport I/O failure or timeout on the channel.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device never acknowledged the sync handshake.
    #[error("no sync acknowledgement after {attempts} attempt(s); is the device connected and in bootloader mode?")]
    SyncTimeout {
        /// Number of sync commands sent before giving up.
        attempts: usize,
    },

    /// Unexpected status tag, unknown opcode, or malformed frame.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// CRC mismatch on a write chunk.
    #[error("CRC mismatch for {len} bytes at {addr:#010x}: sent {expected:#010x}, device reported {actual:#010x}")]
    Integrity {
        /// Start address of the chunk.
        addr: u32,
        /// Chunk length in bytes.
        len: u32,
        /// CRC32 computed locally over the chunk.
        expected: u32,
        /// CRC32 the device reported back.
        actual: u32,
    },

    /// The image does not fit the reported flash geometry.
    #[error("image does not fit flash: {0}")]
    Bounds(String),

    /// The device answered ERR! where OK was expected.
    #[error("device reported an error during {step}")]
    Device {
        /// Name of the flashing step that failed.
        step: &'static str,
    },

    /// Failed to load the program image.
    #[error("failed to load image: {0}")]
    Image(String),
}

impl Error {
    /// Whether this failure originated on the device side.
    ///
    /// Device-originated failures usually mean the bootloader is in an
    /// undefined state; the recommended recovery is a power cycle.
    #[must_use]
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device { .. } | Self::Integrity { .. })
    }
}
