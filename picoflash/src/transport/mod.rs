//! Transport abstraction for the bootloader byte stream.
//!
//! The protocol has no message boundaries: both sides always know
//! exactly how many bytes to expect from the opcode already in flight,
//! so the channel only needs two operations, an exact-length read and
//! a raw write. The protocol core is written once against the
//! [`Transport`] trait; the transports differ only in plumbing:
//!
//! ```text
//! +-------------------+     +-------------------+
//! |  Host Flasher     |     | Device Processor  |
//! +---------+---------+     +---------+---------+
//!           |                         |
//!           v                         v
//! +---------+---------+     +---------+---------+
//! |  Transport trait  |     |  Transport trait  |
//! +---+-------+---+---+     +---+-------+---+---+
//!     |       |   |             |       |
//!   serial   tcp pipe          tcp     pipe
//! ```
//!
//! - [`SerialTransport`]: a physical serial link (feature `native`)
//! - [`TcpTransport`]: a socket to the simulated device server
//! - [`PipeTransport`]: an in-process duplex channel for tests

#[cfg(feature = "native")]
pub mod serial;

pub mod pipe;
pub mod tcp;

use crate::error::Result;

/// A duplex byte channel carrying bootloader traffic.
///
/// Reads are exact-length: `read_exact` blocks until the buffer is
/// full and fails with a transport error on disconnect or timeout.
/// Writes carry no implicit framing.
pub trait Transport {
    /// Read exactly `buf.len()` bytes into `buf`.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Send raw bytes.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Human-readable channel name for diagnostics.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_all(buf)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// Re-export the implementations
pub use pipe::PipeTransport;
pub use tcp::TcpTransport;

#[cfg(feature = "native")]
pub use serial::{PortInfo, SerialConfig, SerialTransport, list_ports};
