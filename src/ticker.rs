//! Frame ticker (`spec.md` §4.7): turns a stream of `FramebufferUpdate`
//! arrivals into a steady `framerate`-paced sequence of
//! `Consumer::update_screen` calls, backfilling duplicate frames when the
//! server falls behind the target rate.
//!
//! Also holds the two-pass replay driver: a scan pass builds a
//! [`FrameIndex`] of capture-file byte offsets without emitting anything,
//! then a render pass seeks to each frame boundary and decodes it for
//! real.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::transport::{Seekable, Transport};

/// Emits duplicate-frame ticks to keep a consumer's frame count in lock
/// step with wall-clock time even when the server updates more slowly
/// than `rate` (`spec.md` §4.7 "Duplicate-frame backfill").
///
/// `target = floor((t - t0) * rate) + 1` is the frame number that should
/// have been reached by time `t`; the ticker calls `update_screen` once
/// per frame between the last emitted frame and `target`, each carrying
/// the *new* frame's own pixel state (the same last-known pixels,
/// repeated) so a downstream movie writer never has to special-case gaps.
pub struct FrameTicker {
    rate: f64,
    t0: Option<f64>,
    last_frame: u64,
}

impl FrameTicker {
    pub fn new(rate: u32) -> FrameTicker {
        FrameTicker {
            rate: rate as f64,
            t0: None,
            last_frame: 0,
        }
    }

    /// Call once per update cycle. Returns how many frame ticks (possibly
    /// zero, possibly several if the server stalled) the consumer should
    /// now be sent at time `t`.
    pub fn advance(&mut self, t: f64) -> u64 {
        let t0 = *self.t0.get_or_insert(t);
        let target = ((t - t0) * self.rate).floor() as i64 + 1;
        let target = target.max(0) as u64;
        let ticks = target.saturating_sub(self.last_frame);
        self.last_frame = target;
        ticks
    }
}

/// One capture-file update's byte range, recorded during the scan pass.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub t: f64,
    pub begin: u64,
    pub end: u64,
}

/// The byte-offset map built by scanning a capture file once
/// (`spec.md` §4.7 "Two-pass replay"). `render` then seeks directly to
/// each frame instead of re-parsing from the start.
#[derive(Debug, Default)]
pub struct FrameIndex {
    pub frames: Vec<Frame>,
}

impl FrameIndex {
    pub fn new() -> FrameIndex {
        FrameIndex { frames: Vec::new() }
    }

    pub fn push(&mut self, t: f64, begin: u64, end: u64) {
        self.frames.push(Frame { t, begin, end });
    }
}

/// Pass 1 of the two-pass replay: walks a capture file once from its
/// current position with event emission disabled, recording each update
/// cycle's `(timestamp, begin, end)` byte range. `decode_one` drives a
/// single server-to-client message through the decoder — its return
/// value is discarded; only the byte range it consumed matters here.
///
/// Every record is an 8-byte `(sec, usec)` timestamp (`spec.md` §6)
/// immediately followed by one message, so each scanned frame spans
/// exactly one `decode_one` call.
pub fn scan<S, D>(transport: &mut S, mut decode_one: D) -> Result<FrameIndex>
where
    S: Transport + Seekable,
    D: FnMut(&mut S) -> Result<()>,
{
    let mut index = FrameIndex::new();
    loop {
        let timestamp = match transport.recv(8) {
            Ok(bytes) => bytes,
            Err(Error::EndOfStream) => break,
            Err(err) => return Err(err),
        };
        let t = BigEndian::read_u32(&timestamp[0..4]) as f64
            + BigEndian::read_u32(&timestamp[4..8]) as f64 / 1_000_000.0;
        let begin = transport.tell()?;
        decode_one(transport)?;
        let end = transport.tell()?;
        index.push(t, begin, end);
    }
    Ok(index)
}

/// Pass 2 of the two-pass replay: seeks to each indexed frame's `begin`
/// and hands the transport to `on_frame`, which decodes and applies that
/// frame's message(s) and ticks the consumer. Combined into one closure
/// (rather than a separate decode/apply-events closure plus an
/// end-of-frame closure) since both would otherwise need to borrow the
/// same consumer mutably at once.
pub fn render<S, F>(transport: &mut S, index: &FrameIndex, mut on_frame: F) -> Result<()>
where
    S: Transport + Seekable,
    F: FnMut(&mut S, &Frame) -> Result<()>,
{
    for frame in &index.frames {
        transport.seek(frame.begin)?;
        on_frame(transport, frame)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecvOutcome;
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use std::time::Duration;

    struct VecTransport(Cursor<Vec<u8>>);

    impl Transport for VecTransport {
        fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
            let mut buf = vec![0u8; n];
            self.0.read_exact(&mut buf).map_err(|_| Error::EndOfStream)?;
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

    impl Seekable for VecTransport {
        fn seek(&mut self, pos: u64) -> Result<()> {
            self.0.seek(SeekFrom::Start(pos))?;
            Ok(())
        }
        fn tell(&mut self) -> Result<u64> {
            Ok(self.0.seek(SeekFrom::Current(0))?)
        }
    }

    /// Two one-byte "messages", each preceded by an 8-byte timestamp, the
    /// way `RecordingTee::mark_update_boundary` writes them.
    fn two_frame_capture() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.push(0xAA);
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&500_000u32.to_be_bytes());
        buf.push(0xBB);
        buf
    }

    #[test]
    fn scan_indexes_one_frame_per_timestamped_message() {
        let mut transport = VecTransport(Cursor::new(two_frame_capture()));
        let index = scan(&mut transport, |t| t.recv(1).map(|_| ())).unwrap();
        assert_eq!(index.frames.len(), 2);
        assert_eq!(index.frames[0].t, 0.0);
        assert_eq!(index.frames[1].t, 0.5);
        assert_eq!(index.frames[1].begin - index.frames[0].begin, 9); // 8-byte timestamp + 1-byte message
    }

    #[test]
    fn render_revisits_indexed_frames_in_order() {
        let mut transport = VecTransport(Cursor::new(two_frame_capture()));
        let index = scan(&mut transport, |t| t.recv(1).map(|_| ())).unwrap();

        let mut seen = Vec::new();
        render(&mut transport, &index, |t, frame| {
            let byte = t.recv(1)?[0];
            seen.push((frame.t, byte));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![(0.0, 0xAA), (0.5, 0xBB)]);
    }

    #[test]
    fn first_tick_always_fires_once() {
        let mut ticker = FrameTicker::new(10);
        assert_eq!(ticker.advance(0.0), 1);
    }

    #[test]
    fn steady_rate_emits_one_tick_per_frame_interval() {
        let mut ticker = FrameTicker::new(10);
        assert_eq!(ticker.advance(0.0), 1);
        assert_eq!(ticker.advance(0.1), 1);
        assert_eq!(ticker.advance(0.2), 1);
    }

    #[test]
    fn stalled_server_backfills_duplicate_frames() {
        let mut ticker = FrameTicker::new(10);
        assert_eq!(ticker.advance(0.0), 1);
        // Nothing arrived for 0.5s at 10fps: frames 2..=6 must be backfilled.
        assert_eq!(ticker.advance(0.5), 5);
    }

    #[test]
    fn frame_index_records_byte_ranges_in_order() {
        let mut index = FrameIndex::new();
        index.push(0.0, 0, 10);
        index.push(0.1, 10, 25);
        assert_eq!(index.frames.len(), 2);
        assert_eq!(index.frames[1].begin, 10);
    }
}
