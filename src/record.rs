//! Recording tee (`spec.md` §4.2), producing the `vncLog0.0` capture
//! format: a forged v3.3 None-auth handshake header followed by the raw
//! server bytes, with an 8-byte `(sec, usec)` timestamp inserted ahead of
//! each `FramebufferUpdate` cycle.

use std::io::Write;
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{RecvOutcome, Result};
use crate::protocol::{Message, PixelFormat, ServerInit, Version};
use crate::transport::Transport;

/// Wraps a live [`Transport`], mirroring every inbound byte to `sink`
/// while still handing the bytes to the caller untouched. The session
/// loop drives this exactly like any other transport; it never needs to
/// know recording is happening.
pub struct RecordingTee<T: Transport, W: Write> {
    inner: T,
    sink: W,
}

impl<T: Transport, W: Write> RecordingTee<T, W> {
    /// `sink` must already contain the forged handshake header written by
    /// [`write_capture_header`] before the first byte is mirrored.
    pub fn new(inner: T, sink: W) -> RecordingTee<T, W> {
        RecordingTee { inner, sink }
    }

    /// Writes an 8-byte `(seconds, microseconds)` timestamp, marking the
    /// start of the next `FramebufferUpdate` cycle. The session loop calls
    /// this once per poll iteration before issuing the next
    /// `recv_with_timeout`, so every recorded update is preceded by
    /// exactly one timestamp regardless of how many rectangles it has.
    pub fn mark_update_boundary(&mut self, elapsed: Duration) -> Result<()> {
        self.sink.write_u32::<BigEndian>(elapsed.as_secs() as u32)?;
        self.sink
            .write_u32::<BigEndian>(elapsed.subsec_micros())?;
        Ok(())
    }

    pub fn into_inner(self) -> (T, W) {
        (self.inner, self.sink)
    }
}

impl<T: Transport, W: Write> Transport for RecordingTee<T, W> {
    fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
        let data = self.inner.recv(n)?;
        self.sink.write_all(&data)?;
        Ok(data)
    }

    fn recv_with_timeout(&mut self, n: usize, dt: Duration) -> Result<RecvOutcome> {
        match self.inner.recv_with_timeout(n, dt)? {
            RecvOutcome::Ready(data) => {
                self.sink.write_all(&data)?;
                Ok(RecvOutcome::Ready(data))
            }
            RecvOutcome::Timeout => Ok(RecvOutcome::Timeout),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<()> {
        // Only inbound server bytes are recorded; the client's own
        // requests are reconstructible from `preferred_encodings` and
        // aren't needed to replay the screen (`spec.md` §4.2).
        self.inner.send(buf)
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn mark_frame_boundary(&mut self, elapsed: Duration) -> Result<()> {
        self.mark_update_boundary(elapsed)
    }
}

/// The 9-byte magic every capture file opens with (`spec.md` §6, offset
/// 0). [`crate::transport::FileTransport::open`] verifies and consumes
/// exactly these bytes before handing the rest of the file to the
/// handshake reader.
pub const MAGIC: &[u8; 9] = b"vncLog0.0";

/// Writes the 9-byte magic, the forged v3.3/None-auth handshake header,
/// and the real `ServerInit` the live handshake negotiated (`spec.md` §6
/// "Capture file format"). Replay never re-authenticates; this header
/// exists purely so [`crate::handshake::perform`] can read a capture file
/// through the exact same state machine it uses for a live server.
pub fn write_capture_header<W: Write>(sink: &mut W, server_init: &ServerInit) -> Result<()> {
    sink.write_all(MAGIC)?;
    Version::Rfb33.write_to(sink)?;
    sink.write_u32::<BigEndian>(1)?; // security = None
    server_init.write_to(sink)?;
    Ok(())
}

/// Convenience used by integration tooling that wants the canonical
/// header without a live negotiation (e.g. a synthetic fixture).
pub fn synthetic_capture_header(width: u16, height: u16, name: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let server_init = ServerInit {
        framebuffer_width: width,
        framebuffer_height: height,
        pixel_format: PixelFormat::canonical(),
        name: name.to_string(),
    };
    write_capture_header(&mut buf, &server_init).expect("writing to a Vec never fails");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;
    use std::io::Cursor;

    struct BufTransport(Cursor<Vec<u8>>);

    impl Transport for BufTransport {
        fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
            use std::io::Read;
            let mut buf = vec![0u8; n];
            self.0
                .read_exact(&mut buf)
                .map_err(|_| crate::error::Error::ConnectionClosed)?;
            Ok(buf)
        }
        fn recv_with_timeout(&mut self, n: usize, _dt: Duration) -> Result<RecvOutcome> {
            self.recv(n).map(RecvOutcome::Ready)
        }
        fn send(&mut self, _buf: &[u8]) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    #[test]
    fn recv_mirrors_bytes_to_sink() {
        let inner = BufTransport(Cursor::new(vec![1, 2, 3, 4, 5]));
        let mut tee = RecordingTee::new(inner, Vec::new());
        assert_eq!(tee.recv(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(tee.recv(2).unwrap(), vec![4, 5]);
        let (_, sink) = tee.into_inner();
        assert_eq!(sink, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn mark_update_boundary_writes_eight_bytes() {
        let inner = BufTransport(Cursor::new(Vec::new()));
        let mut tee = RecordingTee::new(inner, Vec::new());
        tee.mark_update_boundary(Duration::new(2, 500_000)).unwrap();
        let (_, sink) = tee.into_inner();
        assert_eq!(sink.len(), 8);
        assert_eq!(BigEndian::read_u32(&sink[0..4]), 2);
        assert_eq!(BigEndian::read_u32(&sink[4..8]), 500);
    }

    #[test]
    fn capture_header_round_trips_through_the_handshake_reader() {
        let header = synthetic_capture_header(640, 480, "demo");
        let mut cursor = Cursor::new(header);
        let mut magic = [0u8; 9];
        std::io::Read::read_exact(&mut cursor, &mut magic).unwrap();
        assert_eq!(&magic, MAGIC);
        let version = Version::read_from(&mut cursor).unwrap();
        assert_eq!(version, Version::Rfb33);
        let mut security = [0u8; 4];
        std::io::Read::read_exact(&mut cursor, &mut security).unwrap();
        assert_eq!(u32::from_be_bytes(security), 1);
        let server_init = ServerInit::read_from(&mut cursor).unwrap();
        assert_eq!(server_init.framebuffer_width, 640);
        assert_eq!(server_init.name, "demo");
    }
}
