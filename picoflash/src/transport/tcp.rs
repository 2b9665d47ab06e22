//! TCP transport, the link between the host and the simulated device
//! server.

use crate::error::{Error, Result};
use crate::transport::Transport;
use log::trace;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP socket transport.
pub struct TcpTransport {
    stream: TcpStream,
    name: String,
}

impl TcpTransport {
    /// Connect to a listening device, bounding every read by `timeout`.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(Error::Transport)?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(Error::Transport)?;
        stream.set_nodelay(true).map_err(Error::Transport)?;
        let name = match stream.peer_addr() {
            Ok(peer) => format!("tcp://{peer}"),
            Err(_) => "tcp".to_string(),
        };
        Ok(Self { stream, name })
    }

    /// Wrap an accepted connection on the device side.
    ///
    /// Device reads stay blocking: the processor sits in WAIT_SYNC for
    /// as long as the client stays connected.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true).map_err(Error::Transport)?;
        let name = match stream.peer_addr() {
            Ok(peer) => format!("tcp://{peer}"),
            Err(_) => "tcp".to_string(),
        };
        Ok(Self { stream, name })
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).map_err(|e| {
            // SO_RCVTIMEO surfaces as WouldBlock on some platforms.
            if e.kind() == std::io::ErrorKind::WouldBlock {
                Error::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{}: read timed out", self.name),
                ))
            } else {
                Error::Transport(e)
            }
        })?;
        trace!("{}: read {} bytes", self.name, buf.len());
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).map_err(Error::Transport)?;
        trace!("{}: wrote {} bytes", self.name, buf.len());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
