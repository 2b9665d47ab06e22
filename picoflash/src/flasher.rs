//! Host-side flashing orchestrator.
//!
//! The host drives a fixed sequence, not a loop over arbitrary input:
//!
//! ```text
//! Sync -> Info -> Pad -> Bounds -> Erase -> Write -> Seal -> Go
//! ```
//!
//! Every step is fatal on failure; the only retry in the whole
//! protocol is the bounded sync handshake. Exactly one command is ever
//! in flight: each step fully consumes its response before the next
//! command goes out, because the wire carries no request identifiers
//! and reordering would be unsound.

use crate::error::{Error, Result};
use crate::image::Image;
use crate::protocol::wire::{self, ARG_LEN, Command, DeviceInfo, Status, TAG_LEN};
use crate::transport::Transport;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace, warn};
use std::io;
use std::thread;
use std::time::Duration;

/// How many sync commands to send before declaring the device absent.
pub const MAX_SYNC_ATTEMPTS: usize = 1;

/// Fixed pause before reading a response.
///
/// The channel has no message boundaries; the reader always knows how
/// many bytes to expect, so the delay exists purely to let them arrive.
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Flashing stages reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Handshaking with the bootloader.
    Sync,
    /// Reading flash geometry.
    Info,
    /// Erasing the target range.
    Erase,
    /// Writing image chunks.
    Write,
    /// Sealing the image.
    Seal,
    /// Booting the application.
    Go,
}

impl Stage {
    /// Short human-readable label for this stage.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Info => "info",
            Self::Erase => "erase",
            Self::Write => "write",
            Self::Seal => "seal",
            Self::Go => "go",
        }
    }
}

/// Host flashing orchestrator.
///
/// Generic over the transport, so the same driver talks to a physical
/// serial link, a TCP socket, or an in-process pipe.
pub struct Flasher<T: Transport> {
    transport: T,
    settle_delay: Duration,
    max_sync_attempts: usize,
}

impl<T: Transport> Flasher<T> {
    /// Create a flasher over an open transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            settle_delay: SETTLE_DELAY,
            max_sync_attempts: MAX_SYNC_ATTEMPTS,
        }
    }

    /// Set the settle delay inserted before each response read.
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Set the sync attempt budget.
    #[must_use]
    pub fn with_max_sync_attempts(mut self, attempts: usize) -> Self {
        self.max_sync_attempts = attempts.max(1);
        self
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the flasher and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn send(&mut self, cmd: &Command) -> Result<()> {
        let bytes = cmd.encode();
        trace!(
            "{}: sending {:?} ({} bytes)",
            self.transport.name(),
            cmd.opcode,
            bytes.len()
        );
        self.transport.write_all(&bytes)
    }

    /// Read and classify the 4-byte status tag opening a response.
    fn read_status(&mut self, step: &'static str) -> Result<Status> {
        thread::sleep(self.settle_delay);
        let mut tag = [0u8; TAG_LEN];
        self.transport.read_exact(&mut tag)?;
        Status::from_tag(tag).ok_or_else(|| {
            Error::Protocol(format!("unexpected status tag {tag:02x?} during {step}"))
        })
    }

    fn expect_ok(&mut self, step: &'static str) -> Result<()> {
        match self.read_status(step)? {
            Status::Ok => Ok(()),
            Status::Err => Err(Error::Device { step }),
            Status::SyncAck => Err(Error::Protocol(format!(
                "sync acknowledgement arrived during {step}"
            ))),
        }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; ARG_LEN];
        self.transport.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Handshake with the bootloader.
    ///
    /// The one retried step: a timed-out or mismatched acknowledgement
    /// burns an attempt instead of aborting, until the budget runs out.
    pub fn sync(&mut self) -> Result<()> {
        for attempt in 1..=self.max_sync_attempts {
            debug!(
                "{}: sync attempt {attempt}/{}",
                self.transport.name(),
                self.max_sync_attempts
            );
            self.send(&Command::sync())?;
            thread::sleep(self.settle_delay);

            let mut tag = [0u8; TAG_LEN];
            match self.transport.read_exact(&mut tag) {
                Ok(()) if tag == Status::SyncAck.tag() => {
                    info!("{}: device answered sync", self.transport.name());
                    return Ok(());
                },
                Ok(()) => {
                    warn!("unexpected sync response {tag:02x?}");
                },
                Err(Error::Transport(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    debug!("sync attempt {attempt} timed out");
                },
                Err(e) => return Err(e),
            }
        }
        Err(Error::SyncTimeout {
            attempts: self.max_sync_attempts,
        })
    }

    /// Query flash geometry.
    pub fn info(&mut self) -> Result<DeviceInfo> {
        self.send(&Command::info())?;
        self.expect_ok("info")?;
        let mut args = [0u32; DeviceInfo::NFIELDS];
        for slot in &mut args {
            *slot = self.read_u32()?;
        }
        let device = DeviceInfo::from_args(&args)?;
        if device.erase_size == 0 || device.write_size == 0 || device.max_data_len == 0 {
            return Err(Error::Protocol(format!(
                "device reported zero-sized geometry: {device:?}"
            )));
        }
        debug!(
            "device info: flash {:#010x}+{:#x}, erase {}, write {}, max payload {}",
            device.flash_addr,
            device.flash_size,
            device.erase_size,
            device.write_size,
            device.max_data_len
        );
        Ok(device)
    }

    /// Read back `len` bytes at `addr`.
    ///
    /// The response length is caller-trusted: a device holding fewer
    /// bytes there answers short and this read surfaces as a transport
    /// timeout. That is the wire format's documented limitation, not a
    /// recoverable condition.
    pub fn read(&mut self, addr: u32, len: u32) -> Result<Vec<u8>> {
        self.send(&Command::read(addr, len))?;
        self.expect_ok("read")?;
        let mut data = vec![0u8; len as usize];
        self.transport.read_exact(&mut data)?;
        Ok(data)
    }

    /// Erase `len` bytes at `addr`.
    pub fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        self.send(&Command::erase(addr, len))?;
        self.expect_ok("erase")
    }

    /// Write one chunk and verify the CRC32 the device echoes back.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let expected = wire::crc32(data);
        self.send(&Command::write(addr, data.to_vec()))?;
        self.expect_ok("write")?;
        let actual = self.read_u32()?;
        if actual != expected {
            return Err(Error::Integrity {
                addr,
                len: data.len() as u32,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Seal the complete image by address, length, and whole-image CRC.
    pub fn seal(&mut self, addr: u32, len: u32, crc: u32) -> Result<()> {
        self.send(&Command::seal(addr, len, crc))?;
        self.expect_ok("seal")
    }

    /// Boot the application at `addr`. Fire-and-forget: no response is
    /// awaited, so this step cannot itself fail the session.
    pub fn go(&mut self, addr: u32) -> Result<()> {
        self.send(&Command::go(addr))?;
        info!("{}: boot command sent for {addr:#010x}", self.transport.name());
        Ok(())
    }

    /// Run the full flashing sequence for `image`.
    ///
    /// On success the session is over and the application is expected
    /// to be running; the returned geometry is what the device
    /// reported. `progress` is called with `(stage, done, total)` as
    /// work completes.
    pub fn program<F>(&mut self, image: &Image, mut progress: F) -> Result<DeviceInfo>
    where
        F: FnMut(Stage, usize, usize),
    {
        self.sync()?;
        progress(Stage::Sync, 1, 1);

        let device = self.info()?;
        progress(Stage::Info, 1, 1);

        // Pad up to the write granularity; CRCs below cover the padded
        // data, which is exactly what the device will hold.
        let data = image.padded(device.write_size);
        let padded_len = data.len() as u64;

        let image_start = u64::from(image.addr);
        if image_start < u64::from(device.flash_addr) {
            return Err(Error::Bounds(format!(
                "image load address {:#010x} is below the flash base {:#010x}",
                image.addr, device.flash_addr
            )));
        }
        if image_start + padded_len > device.flash_end() {
            return Err(Error::Bounds(format!(
                "image of {padded_len} bytes at {:#010x} does not fit in flash \
                 {:#010x}+{:#x}",
                image.addr, device.flash_addr, device.flash_size
            )));
        }

        let erase_size = u64::from(device.erase_size);
        let erase_len = padded_len.div_ceil(erase_size) * erase_size;
        let erase_chunks = (erase_len / erase_size) as usize;
        info!(
            "erasing {erase_len} bytes at {:#010x} in {erase_chunks} chunk(s)",
            image.addr
        );
        for chunk in 0..erase_chunks {
            #[allow(clippy::cast_possible_truncation)] // bounded by the flash range check
            let addr = (image_start + chunk as u64 * erase_size) as u32;
            self.erase(addr, device.erase_size)?;
            progress(Stage::Erase, chunk + 1, erase_chunks);
        }

        info!("writing {} bytes at {:#010x}", data.len(), image.addr);
        let mut done = 0usize;
        for chunk in data.chunks(device.max_data_len as usize) {
            #[allow(clippy::cast_possible_truncation)] // bounded by the flash range check
            let addr = (image_start + done as u64) as u32;
            self.write(addr, chunk)?;
            done += chunk.len();
            progress(Stage::Write, done, data.len());
        }

        #[allow(clippy::cast_possible_truncation)] // padded_len <= flash_size
        self.seal(image.addr, padded_len as u32, wire::crc32(&data))?;
        progress(Stage::Seal, 1, 1);

        self.go(image.addr)?;
        progress(Stage::Go, 1, 1);

        info!("flashing complete; application should be running");
        Ok(device)
    }
}
