//! Device-side bootloader: flash model and command processor.
//!
//! This is the software stand-in for a board in bootloader mode. The
//! [`CommandProcessor`] parses the same byte stream real firmware
//! parses and mutates a [`FlashModel`]; a host driving it over any
//! transport cannot tell it apart from hardware.

pub mod flash;
pub mod processor;

pub use flash::FlashModel;
pub use processor::{CommandProcessor, SessionOutcome};
