//! Connects to a live RFB server and records its screen updates to a
//! `vncLog0.0` capture file, stopping on Ctrl-C.

use std::fs::File;

use clap::Parser;
use rfb_client::{CancelToken, ClientConfig, Consumer, PixelFormat, Rect};

#[derive(Parser)]
#[command(about = "Record a VNC session to a capture file")]
struct Args {
    /// Server hostname or IP
    host: String,

    /// Server port
    #[arg(default_value_t = 5900)]
    port: u16,

    /// Output capture file path
    #[arg(short, long, default_value = "capture.vnclog")]
    out: String,

    /// Target framerate for recorded frame ticks
    #[arg(short, long, default_value_t = 10)]
    framerate: u32,
}

/// A consumer that only cares about being told when to stop; all the
/// actual pixel mirroring happens at the transport layer via
/// `rfb_client::record`.
struct NullConsumer;

impl Consumer for NullConsumer {
    fn init_screen(&mut self, width: u16, height: u16, name: &str) -> Rect {
        log::info!("recording {}x{} ({})", width, height, name);
        Rect::full_screen(width, height)
    }

    fn set_format(&mut self, _format: PixelFormat) {}
    fn process_pixels(&mut self, _rect: Rect, _rgb: &[u8]) {}
    fn process_solid(&mut self, _rect: Rect, _color: (u8, u8, u8)) {}
    fn change_cursor(&mut self, _w: u16, _h: u16, _hx: u16, _hy: u16, _rgba: &[u8]) {}
    fn move_cursor(&mut self, _x: u16, _y: u16) {}
    fn update_screen(&mut self, t: f64) {
        log::debug!("frame at t={:.2}", t);
    }
    fn close(&mut self) {
        log::info!("recording stopped");
    }
}

fn main() -> rfb_client::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = ClientConfig::tcp(args.host, args.port).with_framerate(args.framerate);
    let sink = File::create(&args.out)?;

    // Reconnect is off by default (ClientConfig::tcp) so a dropped
    // connection ends the recording instead of retrying silently.
    let token = CancelToken::new();
    let mut consumer = NullConsumer;
    rfb_client::record(config, sink, &mut consumer, &token)
}
