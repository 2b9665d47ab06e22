//! RP2040 serial bootloader commands and framing.
//!
//! This module implements the wire format spoken by the serial
//! bootloader: fixed-width little-endian frames identified by a 4-byte
//! ASCII tag, with CRC32 integrity checks on write and seal traffic.
//!
//! ## Frame Format
//!
//! Commands are a tag, zero or more fixed arguments, and an optional
//! trailing payload:
//!
//! ```text
//! +---------+-----------------+------------------+
//! |   Tag   | Args (0-3)      | Payload          |
//! +---------+-----------------+------------------+
//! | 4 bytes | 4 bytes each LE | variable, no     |
//! |         |                 | length prefix    |
//! +---------+-----------------+------------------+
//! ```
//!
//! Responses carry a 4-byte status tag (`OKOK`, `ERR!`, or the sync
//! acknowledgement `PICO`) followed by response arguments and payload.
//!
//! The wire is deliberately not self-describing: the payload carries no
//! length prefix, and a response's shape is inferred from the request
//! that produced it. Both sides must agree on the opcode table; if they
//! ever disagree, the desync only surfaces as a byte-count mismatch on
//! a later read. This matches the device firmware and is kept for wire
//! compatibility.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Length of a command or status tag in bytes.
pub const TAG_LEN: usize = 4;

/// Width of a fixed argument in bytes.
pub const ARG_LEN: usize = 4;

/// Command opcodes understood by the bootloader.
///
/// The table is closed: argument count, payload rule, and response
/// shape are pure functions of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Handshake establishing that a live bootloader is listening.
    Sync,
    /// Query flash geometry.
    Info,
    /// Read back a flash range.
    Read,
    /// Erase a flash range.
    Erase,
    /// Write a data chunk to flash.
    Write,
    /// Finalize the image by address, length, and whole-image CRC.
    Seal,
    /// Jump to the application. Fire-and-forget on the host side.
    Go,
}

impl Opcode {
    /// Every opcode in the table, in wire-documentation order.
    pub const ALL: [Self; 7] = [
        Self::Sync,
        Self::Info,
        Self::Read,
        Self::Erase,
        Self::Write,
        Self::Seal,
        Self::Go,
    ];

    /// The 4-byte ASCII tag for this opcode.
    #[must_use]
    pub const fn tag(self) -> [u8; TAG_LEN] {
        match self {
            Self::Sync => *b"SYNC",
            Self::Info => *b"INFO",
            Self::Read => *b"READ",
            Self::Erase => *b"ERAS",
            Self::Write => *b"WRIT",
            Self::Seal => *b"SEAL",
            Self::Go => *b"GOGO",
        }
    }

    /// Look up an opcode by its wire tag.
    #[must_use]
    pub fn from_tag(tag: [u8; TAG_LEN]) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag() == tag)
    }

    /// Number of fixed `u32` arguments this command carries.
    #[must_use]
    pub const fn nargs(self) -> usize {
        match self {
            Self::Sync | Self::Info => 0,
            Self::Go => 1,
            Self::Read | Self::Erase | Self::Write => 2,
            Self::Seal => 3,
        }
    }

    /// Length of the variable payload trailing the arguments.
    ///
    /// Only `Write` carries one; its length is the second argument.
    #[must_use]
    pub fn payload_len(self, args: &[u32]) -> usize {
        match self {
            Self::Write => args[1] as usize,
            _ => 0,
        }
    }

    /// Number of fixed `u32` arguments in the response.
    #[must_use]
    pub const fn resp_nargs(self) -> usize {
        match self {
            Self::Info => 5,
            Self::Write => 1,
            _ => 0,
        }
    }

    /// Length of the variable payload trailing the response arguments,
    /// inferred from the request arguments (the wire has no length
    /// prefix).
    #[must_use]
    pub fn resp_payload_len(self, args: &[u32]) -> usize {
        match self {
            Self::Read => args[1] as usize,
            _ => 0,
        }
    }

    /// Whether the host waits for a response at all.
    ///
    /// `Go` is fire-and-forget: the device jumps to the application and
    /// the host never reads the acknowledgement.
    #[must_use]
    pub const fn expects_response(self) -> bool {
        !matches!(self, Self::Go)
    }
}

/// Response status tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded (`OKOK`).
    Ok,
    /// Command failed (`ERR!`).
    Err,
    /// Sync acknowledgement (`PICO`); not OK-prefixed.
    SyncAck,
}

impl Status {
    /// The 4-byte wire tag for this status.
    #[must_use]
    pub const fn tag(self) -> [u8; TAG_LEN] {
        match self {
            Self::Ok => *b"OKOK",
            Self::Err => *b"ERR!",
            Self::SyncAck => *b"PICO",
        }
    }

    /// Look up a status by its wire tag. Any other tag is a protocol
    /// violation.
    #[must_use]
    pub fn from_tag(tag: [u8; TAG_LEN]) -> Option<Self> {
        [Self::Ok, Self::Err, Self::SyncAck]
            .into_iter()
            .find(|status| status.tag() == tag)
    }

    /// Whether this status reports failure.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Err)
    }
}

/// A request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The opcode tag.
    pub opcode: Opcode,
    /// Fixed arguments, in wire order.
    pub args: Vec<u32>,
    /// Variable trailing payload (only `Write` carries one).
    pub data: Vec<u8>,
}

impl Command {
    /// Build a sync handshake command.
    #[must_use]
    pub fn sync() -> Self {
        Self { opcode: Opcode::Sync, args: Vec::new(), data: Vec::new() }
    }

    /// Build an info query.
    #[must_use]
    pub fn info() -> Self {
        Self { opcode: Opcode::Info, args: Vec::new(), data: Vec::new() }
    }

    /// Build a read command for `len` bytes at `addr`.
    #[must_use]
    pub fn read(addr: u32, len: u32) -> Self {
        Self { opcode: Opcode::Read, args: vec![addr, len], data: Vec::new() }
    }

    /// Build an erase command for `len` bytes at `addr`.
    #[must_use]
    pub fn erase(addr: u32, len: u32) -> Self {
        Self { opcode: Opcode::Erase, args: vec![addr, len], data: Vec::new() }
    }

    /// Build a write command carrying `data` for `addr`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // chunks are bounded by max_data_len
    pub fn write(addr: u32, data: Vec<u8>) -> Self {
        let len = data.len() as u32;
        Self { opcode: Opcode::Write, args: vec![addr, len], data }
    }

    /// Build a seal command confirming `len` bytes at `addr` with the
    /// whole-image `crc`.
    #[must_use]
    pub fn seal(addr: u32, len: u32, crc: u32) -> Self {
        Self { opcode: Opcode::Seal, args: vec![addr, len, crc], data: Vec::new() }
    }

    /// Build a go command jumping to `addr`.
    #[must_use]
    pub fn go(addr: u32) -> Self {
        Self { opcode: Opcode::Go, args: vec![addr], data: Vec::new() }
    }

    /// Encode the command into its wire representation.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(TAG_LEN + self.args.len() * ARG_LEN + self.data.len());
        buf.extend_from_slice(&self.opcode.tag());
        for &arg in &self.args {
            buf.write_u32::<LittleEndian>(arg).unwrap();
        }
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a complete command frame.
    ///
    /// The frame must contain exactly one command; trailing bytes are a
    /// protocol violation (the stream reader knows frame lengths from
    /// the table and never over-reads).
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < TAG_LEN {
            return Err(Error::Protocol(format!(
                "command frame too short: {} bytes",
                buf.len()
            )));
        }
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&buf[..TAG_LEN]);
        let opcode = Opcode::from_tag(tag)
            .ok_or_else(|| Error::Protocol(format!("unknown opcode tag {tag:02x?}")))?;

        let args_end = TAG_LEN + opcode.nargs() * ARG_LEN;
        if buf.len() < args_end {
            return Err(Error::Protocol(format!(
                "truncated {opcode:?} frame: {} of {args_end} bytes",
                buf.len()
            )));
        }
        let args: Vec<u32> = buf[TAG_LEN..args_end]
            .chunks_exact(ARG_LEN)
            .map(LittleEndian::read_u32)
            .collect();

        let data = buf[args_end..].to_vec();
        if data.len() != opcode.payload_len(&args) {
            return Err(Error::Protocol(format!(
                "{opcode:?} payload is {} bytes, expected {}",
                data.len(),
                opcode.payload_len(&args)
            )));
        }
        Ok(Self { opcode, args, data })
    }
}

/// A reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status tag.
    pub status: Status,
    /// Fixed result arguments, in wire order.
    pub args: Vec<u32>,
    /// Variable trailing payload (only `Read` responses carry one).
    pub data: Vec<u8>,
}

impl Response {
    /// Build a bare status response.
    #[must_use]
    pub fn status(status: Status) -> Self {
        Self { status, args: Vec::new(), data: Vec::new() }
    }

    /// Encode the response into its wire representation.
    ///
    /// Error responses carry the status tag alone, whatever arguments
    /// the table promises for the OK case.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(TAG_LEN + self.args.len() * ARG_LEN + self.data.len());
        buf.extend_from_slice(&self.status.tag());
        if !self.status.is_error() {
            for &arg in &self.args {
                buf.write_u32::<LittleEndian>(arg).unwrap();
            }
            buf.extend_from_slice(&self.data);
        }
        buf
    }

    /// Decode a complete response frame against the request that
    /// produced it.
    ///
    /// The expected shape comes from `opcode` and `req_args`; nothing
    /// in the frame itself describes its length.
    pub fn decode(opcode: Opcode, req_args: &[u32], buf: &[u8]) -> Result<Self> {
        if buf.len() < TAG_LEN {
            return Err(Error::Protocol(format!(
                "response frame too short: {} bytes",
                buf.len()
            )));
        }
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&buf[..TAG_LEN]);
        let status = Status::from_tag(tag)
            .ok_or_else(|| Error::Protocol(format!("unknown status tag {tag:02x?}")))?;
        if status.is_error() {
            return Ok(Self::status(status));
        }

        let args_end = TAG_LEN + opcode.resp_nargs() * ARG_LEN;
        let total = args_end + opcode.resp_payload_len(req_args);
        if buf.len() != total {
            return Err(Error::Protocol(format!(
                "{opcode:?} response is {} bytes, expected {total}",
                buf.len()
            )));
        }
        let args: Vec<u32> = buf[TAG_LEN..args_end]
            .chunks_exact(ARG_LEN)
            .map(LittleEndian::read_u32)
            .collect();
        let data = buf[args_end..].to_vec();
        Ok(Self { status, args, data })
    }
}

/// Flash geometry the device reports in its `INFO` response.
///
/// Fetched once per session and held for its remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Base address of the flash region.
    pub flash_addr: u32,
    /// Total flash size in bytes.
    pub flash_size: u32,
    /// Minimum erase chunk size in bytes.
    pub erase_size: u32,
    /// Minimum write chunk size in bytes.
    pub write_size: u32,
    /// Largest payload a single write command may carry.
    pub max_data_len: u32,
}

impl DeviceInfo {
    /// Number of `u32` fields in the wire representation.
    pub const NFIELDS: usize = 5;

    /// Build geometry from the five `INFO` response arguments, in wire
    /// order.
    pub fn from_args(args: &[u32]) -> Result<Self> {
        if args.len() != Self::NFIELDS {
            return Err(Error::Protocol(format!(
                "device info carries {} fields, expected {}",
                args.len(),
                Self::NFIELDS
            )));
        }
        Ok(Self {
            flash_addr: args[0],
            flash_size: args[1],
            erase_size: args[2],
            write_size: args[3],
            max_data_len: args[4],
        })
    }

    /// The five `INFO` response arguments, in wire order.
    #[must_use]
    pub fn to_args(self) -> [u32; Self::NFIELDS] {
        [
            self.flash_addr,
            self.flash_size,
            self.erase_size,
            self.write_size,
            self.max_data_len,
        ]
    }

    /// One past the last flash address.
    #[must_use]
    pub fn flash_end(self) -> u64 {
        u64::from(self.flash_addr) + u64::from(self.flash_size)
    }
}

/// CRC32 (IEEE) over exactly the given bytes.
///
/// Always computed over the un-padded data the remote side is expected
/// to hold, never over transmission padding.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Round `value` up to the next multiple of `to`.
#[must_use]
pub const fn align(value: u32, to: u32) -> u32 {
    value.div_ceil(to) * to
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_ascii() {
        for op in Opcode::ALL {
            assert!(op.tag().iter().all(u8::is_ascii), "{op:?}");
            assert_eq!(Opcode::from_tag(op.tag()), Some(op));
        }
    }

    #[test]
    fn test_table_shapes() {
        assert!(!Opcode::Go.expects_response());
        for op in Opcode::ALL {
            if op != Opcode::Go {
                assert!(op.expects_response(), "{op:?}");
            }
        }
        assert_eq!(Opcode::Info.resp_nargs(), 5);
        assert_eq!(Opcode::Write.resp_nargs(), 1);
        assert_eq!(Opcode::Write.payload_len(&[0, 9]), 9);
        assert_eq!(Opcode::Read.resp_payload_len(&[0, 77]), 77);
        assert_eq!(Opcode::Erase.resp_payload_len(&[0, 77]), 0);
    }

    #[test]
    fn test_command_round_trip_all_opcodes() {
        // Boundary argument values per opcode; Write's second argument
        // is a length and must match the payload.
        let commands = [
            Command::sync(),
            Command::info(),
            Command::read(0, 0),
            Command::read(u32::MAX, u32::MAX),
            Command::erase(0, 0),
            Command::erase(u32::MAX, u32::MAX),
            Command::write(0, Vec::new()),
            Command::write(u32::MAX, vec![0xAA; 256]),
            Command::seal(0, 0, 0),
            Command::seal(u32::MAX, u32::MAX, u32::MAX),
            Command::go(0),
            Command::go(u32::MAX),
        ];
        for cmd in commands {
            let decoded = Command::decode(&cmd.encode()).expect("decode");
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn test_write_encoding_layout() {
        let cmd = Command::write(0x10000000, vec![0xDE, 0xAD]);
        let encoded = cmd.encode();
        assert_eq!(&encoded[..4], b"WRIT");
        assert_eq!(&encoded[4..8], &[0x00, 0x00, 0x00, 0x10]);
        assert_eq!(&encoded[8..12], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(&encoded[12..], &[0xDE, 0xAD]);
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let err = Command::decode(b"BOOP").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_decode_truncated_args() {
        let err = Command::decode(b"ERAS\x00\x00").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_decode_payload_length_mismatch() {
        // WRIT claiming 4 payload bytes but carrying 2.
        let mut buf = Command::write(0, vec![1, 2, 3, 4]).encode();
        buf.truncate(buf.len() - 2);
        assert!(matches!(Command::decode(&buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_response_round_trip() {
        let resp = Response {
            status: Status::Ok,
            args: vec![0x10000000, 0x0100_0000, 4096, 256, 256],
            data: Vec::new(),
        };
        let decoded = Response::decode(Opcode::Info, &[], &resp.encode()).expect("decode");
        assert_eq!(decoded, resp);
    }

    #[test]
    fn test_response_read_payload_inferred_from_request() {
        let resp = Response {
            status: Status::Ok,
            args: Vec::new(),
            data: vec![0xFF; 8],
        };
        let decoded =
            Response::decode(Opcode::Read, &[0x10000000, 8], &resp.encode()).expect("decode");
        assert_eq!(decoded.data.len(), 8);
    }

    #[test]
    fn test_error_response_is_bare_status() {
        let resp = Response {
            status: Status::Err,
            args: vec![1, 2, 3],
            data: vec![0xAB],
        };
        assert_eq!(resp.encode(), b"ERR!");
        let decoded = Response::decode(Opcode::Info, &[], b"ERR!").expect("decode");
        assert_eq!(decoded.status, Status::Err);
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_unknown_status_tag_rejected() {
        let err = Response::decode(Opcode::Erase, &[0, 0], b"WHAT").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_device_info_round_trip() {
        let info = DeviceInfo {
            flash_addr: 0x10000000,
            flash_size: 16 * 1024 * 1024,
            erase_size: 4096,
            write_size: 256,
            max_data_len: 256,
        };
        assert_eq!(DeviceInfo::from_args(&info.to_args()).expect("decode"), info);
        assert!(DeviceInfo::from_args(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_crc32_check_value() {
        // CRC-32/ISO-HDLC check value.
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_align() {
        assert_eq!(align(0, 256), 0);
        assert_eq!(align(256, 256), 256);
        assert_eq!(align(257, 256), 512);
        assert_eq!(align(300, 256), 512);
        assert_eq!(align(1, 4096), 4096);
    }
}
