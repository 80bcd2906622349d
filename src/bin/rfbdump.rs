//! Replays a `vncLog0.0` capture file and prints a line per frame tick
//! and a summary of the rectangles it decoded — a headless stand-in for
//! the movie encoder a real consumer would be.

use clap::Parser;
use rfb_client::{CancelToken, ClientConfig, Consumer, PixelFormat, Rect};

#[derive(Parser)]
#[command(about = "Dump a VNC capture file frame by frame")]
struct Args {
    /// Capture file to replay
    path: String,

    /// Replay framerate
    #[arg(short, long, default_value_t = 10)]
    framerate: u32,

    /// Scan the whole file first to index frame boundaries, then render
    /// from the index instead of decoding straight through
    #[arg(long)]
    two_pass: bool,
}

struct DumpConsumer {
    pixel_rects: u64,
    solid_rects: u64,
    cursor_updates: u64,
}

impl Consumer for DumpConsumer {
    fn init_screen(&mut self, width: u16, height: u16, name: &str) -> Rect {
        println!("screen {}x{} \"{}\"", width, height, name);
        Rect::full_screen(width, height)
    }

    fn set_format(&mut self, format: PixelFormat) {
        println!("format: {}bpp depth {}", format.bits_per_pixel, format.depth);
    }

    fn process_pixels(&mut self, rect: Rect, _rgb: &[u8]) {
        self.pixel_rects += 1;
        log::debug!("raw rect {:?}", rect);
    }

    fn process_solid(&mut self, rect: Rect, color: (u8, u8, u8)) {
        self.solid_rects += 1;
        log::debug!("solid rect {:?} color {:?}", rect, color);
    }

    fn change_cursor(&mut self, _w: u16, _h: u16, _hx: u16, _hy: u16, _rgba: &[u8]) {
        self.cursor_updates += 1;
    }

    fn move_cursor(&mut self, _x: u16, _y: u16) {}

    fn update_screen(&mut self, t: f64) {
        println!(
            "frame t={:.3}s pixel_rects={} solid_rects={} cursor_updates={}",
            t, self.pixel_rects, self.solid_rects, self.cursor_updates
        );
    }

    fn close(&mut self) {
        println!("done");
    }
}

fn main() -> rfb_client::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = ClientConfig::file(args.path.into()).with_framerate(args.framerate);
    let mut consumer = DumpConsumer {
        pixel_rects: 0,
        solid_rects: 0,
        cursor_updates: 0,
    };
    let token = CancelToken::new();
    let result = if args.two_pass {
        rfb_client::replay_two_pass(config, &mut consumer, &token)
    } else {
        rfb_client::replay(config, &mut consumer, &token)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("replay stopped: {e}");
            Err(e)
        }
    }
}
