//! RFB (VNC) protocol client: handshake, pixel-format negotiation,
//! rectangle decoding, and session record/replay.
//!
//! The entry point for most callers is [`connect`] (live) or [`replay`]
//! (capture file), driving a [`Consumer`] with the paint events described
//! in [`types`].

pub mod auth;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod handshake;
pub mod pixel_format;
pub mod protocol;
pub mod record;
pub mod session;
pub mod ticker;
pub mod transport;
pub mod types;

pub use config::{ClientConfig, EncodingTag, PasswordSource, Target};
pub use consumer::Consumer;
pub use error::{Error, RecvOutcome, Result};
pub use protocol::{PixelFormat, Version};
pub use session::CancelToken;
pub use transport::{FileTransport, Seekable, TcpTransport, Transport};
pub use types::{PaintEvent, Rect};

use std::fs::File;
use std::net::TcpStream;

/// Connects to a live server and runs the session loop until the
/// consumer is cancelled or the connection drops (and reconnects are
/// exhausted). A thin convenience wrapper over [`transport::TcpTransport`]
/// + [`session::run`] for the common case.
pub fn connect<C: Consumer>(
    config: ClientConfig,
    consumer: &mut C,
    token: &CancelToken,
) -> Result<()> {
    let target = match &config.target {
        Target::Tcp { host, port } => (host.clone(), *port),
        Target::File { .. } => {
            return Err(Error::protocol("connect() requires a Tcp target; use replay() for files"))
        }
    };
    let transport = TcpTransport::connect((target.0.as_str(), target.1))?;
    let mut reconnect = move || TcpTransport::connect((target.0.as_str(), target.1));
    session::run(transport, config, consumer, token, Some(&mut reconnect))
}

/// Replays a capture file through the same handshake and decoder as a
/// live connection (`spec.md` §6).
pub fn replay<C: Consumer>(config: ClientConfig, consumer: &mut C, token: &CancelToken) -> Result<()> {
    let path = match &config.target {
        Target::File { path } => path.clone(),
        Target::Tcp { .. } => {
            return Err(Error::protocol("replay() requires a File target; use connect() for a live server"))
        }
    };
    let transport = FileTransport::open(File::open(&path)?)?;
    let mut reconnect = move || FileTransport::open(File::open(&path)?);
    session::run(transport, config, consumer, token, Some(&mut reconnect))
}

/// Two-pass replay (`spec.md` §4.7): scans the whole capture file once to
/// index every update cycle's byte range and timestamp with event
/// emission disabled, then seeks straight to each indexed frame and
/// decodes it for real. Lets an offline consumer (e.g. a movie encoder)
/// learn the full frame count and timing up front instead of only
/// discovering it by draining [`replay`] to the end.
pub fn replay_two_pass<C: Consumer>(
    config: ClientConfig,
    consumer: &mut C,
    token: &CancelToken,
) -> Result<()> {
    let path = match &config.target {
        Target::File { path } => path.clone(),
        Target::Tcp { .. } => {
            return Err(Error::protocol("replay_two_pass() requires a File target"))
        }
    };
    let mut config = config;
    let mut transport = FileTransport::open(File::open(&path)?)?;
    let handshaken = handshake::perform(&mut transport, &mut config)?;

    let index = ticker::scan(&mut transport, |t| {
        decoder::read_message(t, &handshaken.converter, handshaken.bytes_per_pixel).map(|_| ())
    })?;

    // Called unconditionally, matching the live loop; two-pass replay
    // never sends a FramebufferUpdateRequest, so the clip rect itself is
    // unused here.
    let server_init = &handshaken.server_init;
    consumer.init_screen(
        server_init.framebuffer_width,
        server_init.framebuffer_height,
        &server_init.name,
    );
    consumer.set_format(server_init.pixel_format);

    let mut ticker = ticker::FrameTicker::new(config.framerate);
    ticker::render(&mut transport, &index, |t, frame| {
        if token.is_cancelled() {
            return Ok(());
        }
        while t.tell()? < frame.end {
            match decoder::read_message(t, &handshaken.converter, handshaken.bytes_per_pixel)? {
                decoder::Dispatch::FramebufferUpdate(events) => {
                    for event in events {
                        session::apply_event(consumer, event);
                    }
                }
                decoder::Dispatch::Ignored => {}
            }
        }
        let ticks = ticker.advance(frame.t);
        for _ in 0..ticks {
            consumer.update_screen(frame.t);
        }
        Ok(())
    })?;

    consumer.close();
    Ok(())
}

/// Connects to a live server, performs the real handshake, writes a
/// forged v3.3/None-auth capture header carrying the real `ServerInit`,
/// then tees every inbound byte from that point on to `sink`
/// (`spec.md` §4.2, §6 "Capture file format"). Replaying the resulting
/// file never needs to redo the original (possibly `VncAuth`) handshake.
pub fn record<C: Consumer, W: std::io::Write>(
    mut config: ClientConfig,
    mut sink: W,
    consumer: &mut C,
    token: &CancelToken,
) -> Result<()> {
    let (host, port) = match &config.target {
        Target::Tcp { host, port } => (host.clone(), *port),
        Target::File { .. } => return Err(Error::protocol("record() requires a Tcp target")),
    };
    config.include_cursor = true;

    let stream = TcpStream::connect((host.as_str(), port))?;
    stream.set_nodelay(true).ok();
    let mut raw = TcpTransport::from_stream(stream);

    let handshaken = handshake::perform(&mut raw, &mut config)?;
    record::write_capture_header(&mut sink, &handshaken.server_init)?;

    let mut tee = record::RecordingTee::new(raw, sink);
    session::run_loop(&mut tee, &config, &handshaken, consumer, token)
}
