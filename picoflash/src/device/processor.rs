//! Device-side command dispatch state machine.
//!
//! The processor consumes the host's byte stream one command at a
//! time:
//!
//! ```text
//! WAIT_SYNC -> READ_OPCODE -> READ_ARGS -> READ_DATA -> HANDLE
//!      ^            ^                                     |
//!      |            +------------------- ok --------------+
//!      +---------- ERROR <------------- fail -------------+
//! ```
//!
//! `WAIT_SYNC` scans for the `SYNC` tag with a streaming prefix
//! matcher, so any amount of line noise before the handshake is
//! tolerated. A recognized `GOGO` ends the session in an explicit
//! terminal state instead of killing the process, so an embedding
//! server can keep accepting connections.

use crate::device::flash::FlashModel;
use crate::error::{Error, Result};
use crate::protocol::wire::{self, Opcode, Response, Status, TAG_LEN};
use crate::transport::Transport;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace};
use std::io;

/// How a device session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The host issued `GOGO`; the application is expected to be
    /// running at `addr`.
    Launched {
        /// Address the device jumped to.
        addr: u32,
    },
    /// The peer closed the connection at a frame boundary.
    Disconnected,
}

/// Per-session parse state. Each state carries exactly the data the
/// next transition needs; nothing outlives the transition that
/// consumes it.
enum State {
    WaitSync,
    ReadOpcode,
    ReadArgs(Opcode),
    ReadData(Opcode, Vec<u32>),
    Handle(Opcode, Vec<u32>, Vec<u8>),
    Error,
    Done(SessionOutcome),
}

/// A handler receives the flash model, the fixed arguments, and the
/// incoming payload, and produces the full response. Handlers hold no
/// state of their own; sessions stay independently testable.
type Handler = fn(&mut FlashModel, &[u32], &[u8]) -> Response;

fn handler_for(opcode: Opcode) -> Handler {
    match opcode {
        Opcode::Sync => handlers::sync,
        Opcode::Info => handlers::info,
        Opcode::Read => handlers::read,
        Opcode::Erase => handlers::erase,
        Opcode::Write => handlers::write,
        Opcode::Seal => handlers::seal,
        Opcode::Go => handlers::go,
    }
}

mod handlers {
    use super::{FlashModel, Response, Status, wire};

    pub(super) fn sync(_flash: &mut FlashModel, _args: &[u32], _data: &[u8]) -> Response {
        Response::status(Status::SyncAck)
    }

    pub(super) fn info(flash: &mut FlashModel, _args: &[u32], _data: &[u8]) -> Response {
        Response {
            status: Status::Ok,
            args: flash.geometry().to_args().to_vec(),
            data: Vec::new(),
        }
    }

    pub(super) fn read(flash: &mut FlashModel, args: &[u32], _data: &[u8]) -> Response {
        Response {
            status: Status::Ok,
            args: Vec::new(),
            data: flash.read(args[0], args[1]).to_vec(),
        }
    }

    pub(super) fn erase(flash: &mut FlashModel, args: &[u32], _data: &[u8]) -> Response {
        flash.erase(args[0], args[1]);
        Response::status(Status::Ok)
    }

    /// Always answers with the CRC32 of the bytes as received, whether
    /// or not the flash contents changed.
    pub(super) fn write(flash: &mut FlashModel, args: &[u32], data: &[u8]) -> Response {
        let crc = wire::crc32(data);
        let changed = flash.write(args[0], data);
        log::trace!(
            "write {:#010x}+{}: {}",
            args[0],
            data.len(),
            if changed { "programmed" } else { "already present" }
        );
        Response {
            status: Status::Ok,
            args: vec![crc],
            data: Vec::new(),
        }
    }

    /// The model validates nothing beyond framing here.
    pub(super) fn seal(_flash: &mut FlashModel, _args: &[u32], _data: &[u8]) -> Response {
        Response::status(Status::Ok)
    }

    pub(super) fn go(_flash: &mut FlashModel, _args: &[u32], _data: &[u8]) -> Response {
        Response::status(Status::Ok)
    }
}

/// Device command processor: one per session, owning its transport and
/// flash model.
pub struct CommandProcessor<T: Transport> {
    transport: T,
    flash: FlashModel,
}

impl<T: Transport> CommandProcessor<T> {
    /// Create a processor for one session.
    pub fn new(transport: T, flash: FlashModel) -> Self {
        Self { transport, flash }
    }

    /// The flash model backing this session.
    pub fn flash(&self) -> &FlashModel {
        &self.flash
    }

    /// Consume the processor and return its flash model.
    pub fn into_flash(self) -> FlashModel {
        self.flash
    }

    /// Run the session until the host boots the application or
    /// disconnects.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        let mut state = State::WaitSync;
        loop {
            state = match state {
                State::WaitSync => self.wait_sync()?,
                State::ReadOpcode => self.read_opcode()?,
                State::ReadArgs(opcode) => self.read_args(opcode)?,
                State::ReadData(opcode, args) => self.read_data(opcode, args)?,
                State::Handle(opcode, args, data) => self.handle(opcode, &args, &data)?,
                State::Error => self.error()?,
                State::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// Exact read that reports a clean end-of-stream as `Ok(false)`.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.transport.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(Error::Transport(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Scan the stream byte by byte for the `SYNC` tag.
    ///
    /// A mismatching byte restarts the match, but is itself
    /// reconsidered as a possible first tag byte so sequences like
    /// `SSYNC` still synchronize.
    fn wait_sync(&mut self) -> Result<State> {
        let tag = Opcode::Sync.tag();
        let mut matched = 0;
        while matched < tag.len() {
            let mut byte = [0u8; 1];
            if !self.try_read(&mut byte)? {
                return Ok(State::Done(SessionOutcome::Disconnected));
            }
            if byte[0] == tag[matched] {
                matched += 1;
            } else if byte[0] == tag[0] {
                matched = 1;
            } else {
                matched = 0;
            }
        }
        debug!("{}: sync established", self.transport.name());
        self.transport.write_all(&Status::SyncAck.tag())?;
        Ok(State::ReadOpcode)
    }

    fn read_opcode(&mut self) -> Result<State> {
        let mut tag = [0u8; TAG_LEN];
        if !self.try_read(&mut tag)? {
            return Ok(State::Done(SessionOutcome::Disconnected));
        }
        match Opcode::from_tag(tag) {
            Some(opcode) => {
                trace!("{}: opcode {opcode:?}", self.transport.name());
                Ok(State::ReadArgs(opcode))
            },
            None => {
                debug!("{}: unknown opcode {tag:02x?}", self.transport.name());
                Ok(State::Error)
            },
        }
    }

    fn read_args(&mut self, opcode: Opcode) -> Result<State> {
        let mut buf = vec![0u8; opcode.nargs() * wire::ARG_LEN];
        self.transport.read_exact(&mut buf)?;
        let args = buf
            .chunks_exact(wire::ARG_LEN)
            .map(LittleEndian::read_u32)
            .collect();
        Ok(State::ReadData(opcode, args))
    }

    fn read_data(&mut self, opcode: Opcode, args: Vec<u32>) -> Result<State> {
        let mut data = vec![0u8; opcode.payload_len(&args)];
        self.transport.read_exact(&mut data)?;
        Ok(State::Handle(opcode, args, data))
    }

    fn handle(&mut self, opcode: Opcode, args: &[u32], data: &[u8]) -> Result<State> {
        let reply = handler_for(opcode)(&mut self.flash, args, data);
        if reply.status.is_error() {
            return Ok(State::Error);
        }
        self.transport.write_all(&reply.encode())?;
        if opcode == Opcode::Go {
            let addr = args[0];
            info!("{}: jumping to application at {addr:#010x}", self.transport.name());
            return Ok(State::Done(SessionOutcome::Launched { addr }));
        }
        Ok(State::ReadOpcode)
    }

    /// Report the failure and fall back to scanning for a fresh sync.
    fn error(&mut self) -> Result<State> {
        self.transport.write_all(&Status::Err.tag())?;
        Ok(State::WaitSync)
    }
}
