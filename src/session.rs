//! Session loop (`spec.md` §4.6): drives request→decode→emit cycles
//! against a live transport, polls for cancellation, and reconnects on a
//! transport error if the caller asked for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::ClientConfig;
use crate::consumer::Consumer;
use crate::decoder::{self, Dispatch};
use crate::error::{Error, RecvOutcome, Result};
use crate::handshake::{self, Handshaken};
use crate::protocol::{C2S, Message};
use crate::transport::Transport;
use crate::types::Rect;

/// How long a single poll iteration waits for the next byte before giving
/// the cancellation flag another look (`spec.md` §4.6).
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A cooperative stop signal a caller can flip from another thread to
/// unwind the session loop between poll iterations.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Adapter so `Message::write_to` (which wants `std::io::Write`) can send
/// through a [`Transport`]; mirrors `handshake`'s reader/writer shims.
struct TransportWriter<'a, T: Transport + ?Sized>(&'a mut T);

impl<'a, T: Transport + ?Sized> std::io::Write for TransportWriter<'a, T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .send(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn request_update<T: Transport + ?Sized>(transport: &mut T, clip: Rect, incremental: bool) -> Result<()> {
    C2S::FramebufferUpdateRequest {
        incremental,
        x: clip.x,
        y: clip.y,
        width: clip.width,
        height: clip.height,
    }
    .write_to(&mut TransportWriter(transport))
}

/// Runs the handshake once, then loops: request an incremental update,
/// poll for the response with [`POLL_INTERVAL`], decode
/// whatever arrives, hand paint events to `consumer`, and tick frames.
/// Returns when the transport reports `Error::EndOfStream` (file replay
/// ran out) or the token is cancelled; any other transport error is
/// retried per `config.reconnect` if `reconnect_transport` is supplied.
pub fn run<T, C>(
    mut transport: T,
    mut config: ClientConfig,
    consumer: &mut C,
    token: &CancelToken,
    mut reconnect_transport: Option<&mut dyn FnMut() -> Result<T>>,
) -> Result<()>
where
    T: Transport,
    C: Consumer,
{
    let mut attempts_left = config.reconnect;
    loop {
        match run_once(&mut transport, &mut config, consumer, token) {
            Ok(()) => return Ok(()),
            Err(Error::EndOfStream) => return Ok(()),
            Err(err) if attempts_left > 0 => {
                warn!("session error, reconnecting: {err}");
                attempts_left -= 1;
                thread::sleep(Duration::from_secs(1));
                match reconnect_transport.as_deref_mut() {
                    Some(reconnect) => {
                        transport = reconnect()?;
                    }
                    None => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn run_once<T, C>(
    transport: &mut T,
    config: &mut ClientConfig,
    consumer: &mut C,
    token: &CancelToken,
) -> Result<()>
where
    T: Transport,
    C: Consumer,
{
    let handshaken = handshake::perform(transport, config)?;
    run_loop(transport, config, &handshaken, consumer, token)
}

/// The post-handshake request/decode/emit loop (`spec.md` §4.6), split
/// out from [`run_once`] so a caller that already has a [`Handshaken`] —
/// e.g. [`crate::record`], which performs the handshake once and then
/// records only what follows — can drive the loop directly.
pub fn run_loop<T, C>(
    transport: &mut T,
    config: &ClientConfig,
    handshaken: &Handshaken,
    consumer: &mut C,
    token: &CancelToken,
) -> Result<()>
where
    T: Transport,
    C: Consumer,
{
    let Handshaken {
        server_init,
        converter,
        bytes_per_pixel,
        ..
    } = handshaken;
    let bytes_per_pixel = *bytes_per_pixel;

    // Called unconditionally (`spec.md` §6: "called once after the
    // handshake"); its return value is only a fallback when the caller
    // didn't already pin down a clip rect.
    let reported_clip = consumer.init_screen(server_init.framebuffer_width, server_init.framebuffer_height, &server_init.name);
    let clip = config.clipping.unwrap_or(reported_clip);
    consumer.set_format(server_init.pixel_format);

    let start = Instant::now();
    let mut ticker = crate::ticker::FrameTicker::new(config.framerate);

    loop {
        if token.is_cancelled() {
            break;
        }
        match transport.mark_frame_boundary(start.elapsed()) {
            Ok(()) => {}
            Err(Error::EndOfStream) => {
                consumer.close();
                return Err(Error::EndOfStream);
            }
            Err(err) => return Err(err),
        }
        request_update(transport, clip, true)?;

        loop {
            if token.is_cancelled() {
                return Ok(());
            }
            match transport.recv_with_timeout(1, POLL_INTERVAL) {
                Ok(RecvOutcome::Timeout) => continue,
                Ok(RecvOutcome::Ready(first_byte)) => {
                    let dispatch = decoder::read_prefixed_message(transport, first_byte[0], converter, bytes_per_pixel)?;
                    if let Dispatch::FramebufferUpdate(events) = dispatch {
                        for event in events {
                            apply_event(consumer, event);
                        }
                        let t = start.elapsed().as_secs_f64();
                        let ticks = ticker.advance(t);
                        for _ in 0..ticks {
                            consumer.update_screen(t);
                        }
                    }
                    break;
                }
                Err(Error::EndOfStream) => {
                    consumer.close();
                    return Err(Error::EndOfStream);
                }
                Err(err) => return Err(err),
            }
        }
    }

    info!("session loop cancelled");
    consumer.close();
    Ok(())
}

/// Dispatches one decoded [`crate::types::PaintEvent`] to the matching
/// `Consumer` method. Shared by the live loop above and the two-pass
/// replay's render stage in [`crate::ticker`].
pub fn apply_event<C: Consumer>(consumer: &mut C, event: crate::types::PaintEvent) {
    use crate::types::PaintEvent;
    match event {
        PaintEvent::Pixels { rect, rgb } => consumer.process_pixels(rect, &rgb),
        PaintEvent::Solid { rect, color } => consumer.process_solid(rect, color),
        PaintEvent::CursorImage {
            width,
            height,
            hotspot_x,
            hotspot_y,
            rgba,
        } => consumer.change_cursor(width, height, hotspot_x, hotspot_y, &rgba),
        PaintEvent::CursorPos { x, y } => consumer.move_cursor(x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
