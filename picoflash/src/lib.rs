//! # picoflash
//!
//! A library for flashing RP2040 boards over the serial bootloader
//! protocol.
//!
//! This crate provides both ends of the bootloader conversation:
//!
//! - The wire codec: fixed-width command/response framing with CRC32
//!   integrity checks
//! - The host flashing orchestrator that sequences
//!   Sync → Info → Erase → Write → Seal → Go against the flash
//!   geometry the device reports
//! - A device-side command processor driving an in-memory flash model,
//!   so the host logic can be exercised without hardware
//!
//! Both sides are written against the [`transport::Transport`] trait;
//! implementations exist for native serial ports, TCP sockets, and an
//! in-process pipe.
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport`
//!   crate
//! - TCP and in-process transports are always available
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use picoflash::{Flasher, Image};
//! use picoflash::transport::TcpTransport;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = Image::from_bin_file("app.bin".as_ref(), 0x10000000)?;
//!
//!     let transport = TcpTransport::connect("127.0.0.1:8888", Duration::from_secs(1))?;
//!     let mut flasher = Flasher::new(transport);
//!     flasher.program(&image, |_stage, _done, _total| {})?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use transport::{SerialConfig, SerialTransport, list_ports};
pub use {
    device::{CommandProcessor, FlashModel, SessionOutcome},
    error::{Error, Result},
    flasher::{Flasher, Stage},
    image::Image,
    protocol::wire::{Command, DeviceInfo, Opcode, Response, Status, align, crc32},
    transport::{PipeTransport, TcpTransport, Transport},
};
