//! Bootloader wire protocol.

pub mod wire;

// Re-export common types
pub use wire::{Command, DeviceInfo, Opcode, Response, Status, align, crc32};
