//! In-process duplex transport, the test-socket stand-in for a serial
//! link.

use crate::error::{Error, Result};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Default read timeout for pipe ends.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// One end of an in-process duplex byte channel.
///
/// Each end owns a sender into the peer and a receiver from it; bytes
/// arrive in order and a dropped peer surfaces as an end-of-stream
/// transport error, mirroring a closed socket.
pub struct PipeTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    timeout: Duration,
    name: &'static str,
}

impl PipeTransport {
    /// Create a connected pair of pipe ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                pending: VecDeque::new(),
                timeout: DEFAULT_TIMEOUT,
                name: "pipe:a",
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                pending: VecDeque::new(),
                timeout: DEFAULT_TIMEOUT,
                name: "pipe:b",
            },
        )
    }

    /// Set the read timeout for this end.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drain every byte currently buffered on this end without
    /// blocking. Lets tests inspect what the peer has sent so far.
    pub fn drain(&mut self) -> Vec<u8> {
        while let Ok(chunk) = self.rx.try_recv() {
            self.pending.extend(chunk);
        }
        self.pending.drain(..).collect()
    }
}

impl Transport for PipeTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        while self.pending.len() < buf.len() {
            match self.rx.recv_timeout(self.timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::Transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{}: read timed out", self.name),
                    )));
                },
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{}: peer closed", self.name),
                    )));
                },
            }
        }
        for slot in buf.iter_mut() {
            // Cannot fail: the loop above guaranteed enough bytes.
            if let Some(byte) = self.pending.pop_front() {
                *slot = byte;
            }
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.tx.send(buf.to_vec()).map_err(|_| {
            Error::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{}: peer closed", self.name),
            ))
        })
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let (mut a, mut b) = PipeTransport::pair();
        a.write_all(b"INFO").expect("write");
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"INFO");
    }

    #[test]
    fn test_reads_span_writes() {
        let (mut a, mut b) = PipeTransport::pair();
        a.write_all(b"SY").expect("write");
        a.write_all(b"NCxx").expect("write");
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"SYNC");
        let mut rest = [0u8; 2];
        b.read_exact(&mut rest).expect("read rest");
        assert_eq!(&rest, b"xx");
    }

    #[test]
    fn test_timeout() {
        let (_a, b) = PipeTransport::pair();
        let mut b = b.with_timeout(Duration::from_millis(10));
        let mut buf = [0u8; 1];
        let err = b.read_exact(&mut buf).unwrap_err();
        match err {
            Error::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_disconnect() {
        let (a, mut b) = PipeTransport::pair();
        drop(a);
        let mut buf = [0u8; 1];
        let err = b.read_exact(&mut buf).unwrap_err();
        match err {
            Error::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }
}
