//! The consumer contract (`spec.md` §6 "Consumer contract"), replacing
//! the teacher's inheritance-based framebuffer subclassing with a single
//! trait a downstream encoder or movie writer implements (Design Notes
//! "Consumer polymorphism").

use crate::protocol::PixelFormat;
use crate::types::Rect;

/// Receives framebuffer-mutation events and frame ticks from the session
/// loop or the frame ticker. Every method has a default no-op body so an
/// integrator only overrides what it cares about — e.g. a headless
/// dumper that only wants `process_pixels`/`process_solid`.
pub trait Consumer {
    /// Called once after the handshake with the server's screen size and
    /// name; returns the clipping rectangle the session loop should
    /// request updates for.
    fn init_screen(&mut self, width: u16, height: u16, name: &str) -> Rect {
        let _ = name;
        Rect::full_screen(width, height)
    }

    /// Called once after pixel-format negotiation. The default
    /// implementation ignores it; a consumer that wants to reconvert
    /// something itself (rather than trust the already-converted
    /// `process_pixels`/`process_solid` data) can stash it.
    fn set_format(&mut self, _format: PixelFormat) {}

    fn process_pixels(&mut self, _rect: Rect, _rgb: &[u8]) {}

    fn process_solid(&mut self, _rect: Rect, _color: (u8, u8, u8)) {}

    fn change_cursor(&mut self, _width: u16, _height: u16, _hotspot_x: u16, _hotspot_y: u16, _rgba: &[u8]) {}

    fn move_cursor(&mut self, _x: u16, _y: u16) {}

    /// A frame boundary at wall-clock (or, in replay, capture-file) time
    /// `t` seconds.
    fn update_screen(&mut self, _t: f64) {}

    fn close(&mut self) {}
}
