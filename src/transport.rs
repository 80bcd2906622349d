//! Byte transport abstraction (`spec.md` §4.1).
//!
//! Two implementations are provided: [`TcpTransport`], a live socket, and
//! [`FileTransport`], a capture-file reader that also implements
//! [`Seekable`] so the two-pass replay in [`crate::ticker`] can jump
//! around in it. [`crate::record::RecordingTee`] wraps either one.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, RecvOutcome, Result};

/// What a session needs from its byte source: blocking and bounded-time
/// receive, and best-effort send (the file transport silently drops
/// sends — see Design Notes "Shared abstract client vs file/network
/// variants").
pub trait Transport {
    /// Blocks until exactly `n` bytes are read. Fails with
    /// `Error::ConnectionClosed` (live) or `Error::EndOfStream` (file) if
    /// the peer/file ends first.
    fn recv(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Like `recv`, but returns `RecvOutcome::Timeout` instead of blocking
    /// past `dt`. Used by the session loop's 50ms poll (`spec.md` §4.6).
    fn recv_with_timeout(&mut self, n: usize, dt: Duration) -> Result<RecvOutcome>;

    /// Sends `buf`. A no-op for transports with no real peer (file replay).
    fn send(&mut self, buf: &[u8]) -> Result<()>;

    /// Closes the transport; any recv in flight elsewhere should then
    /// fail with `Error::ConnectionClosed`.
    fn close(&mut self);

    /// Marks the start of the next request/update cycle. Only
    /// [`crate::record::RecordingTee`] does anything with this (it writes
    /// the 8-byte timestamp a capture file's scan pass relies on); every
    /// other transport inherits this no-op so the session loop can call it
    /// unconditionally without knowing whether recording is active.
    fn mark_frame_boundary(&mut self, _elapsed: Duration) -> Result<()> {
        Ok(())
    }
}

/// Transports that can be rewound and queried for position — just the
/// file transport, needed for the two-pass replay's seek pass.
pub trait Seekable {
    fn seek(&mut self, pos: u64) -> Result<()>;
    fn tell(&mut self) -> Result<u64>;
}

/// A live TCP connection to an RFB server.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpTransport> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        Ok(TcpTransport { stream })
    }

    pub fn from_stream(stream: TcpStream) -> TcpTransport {
        TcpTransport { stream }
    }
}

impl Transport for TcpTransport {
    fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        match self.stream.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(Error::ConnectionClosed)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn recv_with_timeout(&mut self, n: usize, dt: Duration) -> Result<RecvOutcome> {
        self.stream.set_read_timeout(Some(dt))?;
        let mut buf = vec![0u8; n];
        let result = self.stream.read_exact(&mut buf);
        self.stream.set_read_timeout(None)?;
        match result {
            Ok(()) => Ok(RecvOutcome::Ready(buf)),
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(RecvOutcome::Timeout)
            }
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(Error::ConnectionClosed)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// A capture file (`vncLog0.0`, `spec.md` §6) read back deterministically.
pub struct FileTransport {
    file: File,
    closed: bool,
}

impl FileTransport {
    /// Verifies and consumes the 9-byte `"vncLog0.0"` magic (`spec.md` §6,
    /// offset 0) before returning — everything read afterwards, starting
    /// with the forged handshake, lands at the offsets the format defines.
    pub fn open(mut file: File) -> Result<FileTransport> {
        let mut magic = [0u8; 9];
        file.read_exact(&mut magic)
            .map_err(|_| Error::protocol("capture file shorter than the vncLog0.0 magic"))?;
        if &magic != crate::record::MAGIC {
            return Err(Error::protocol("capture file missing vncLog0.0 magic"));
        }
        Ok(FileTransport {
            file,
            closed: false,
        })
    }
}

impl Transport for FileTransport {
    fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::EndOfStream);
        }
        let mut buf = vec![0u8; n];
        let mut read = 0;
        while read < n {
            let got = self.file.read(&mut buf[read..])?;
            if got == 0 {
                if read == 0 {
                    return Err(Error::EndOfStream);
                }
                return Err(Error::protocol("truncated capture file"));
            }
            read += got;
        }
        Ok(buf)
    }

    /// The file transport has no real concept of waiting: it either has
    /// the bytes already or it's at EOF. Timeouts never occur; a zero-byte
    /// read at EOF surfaces as `Error::EndOfStream` exactly as `recv` does.
    fn recv_with_timeout(&mut self, n: usize, _dt: Duration) -> Result<RecvOutcome> {
        self.recv(n).map(RecvOutcome::Ready)
    }

    fn send(&mut self, _buf: &[u8]) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    /// Consumes the 8-byte timestamp [`crate::record::RecordingTee`] wrote
    /// ahead of this cycle's message, keeping replay's position in lock
    /// step with what recording actually wrote to the file.
    fn mark_frame_boundary(&mut self, _elapsed: Duration) -> Result<()> {
        self.recv(8).map(|_| ())
    }
}

impl Seekable for FileTransport {
    fn seek(&mut self, pos: u64) -> Result<()> {
        use std::io::Seek;
        self.file.seek(io::SeekFrom::Start(pos))?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        use std::io::Seek;
        Ok(self.file.seek(io::SeekFrom::Current(0))?)
    }
}
