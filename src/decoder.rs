//! The rectangle decoder (`spec.md` §4.5) — the message dispatcher and
//! the seven per-encoding decoders (Raw, RRE, CoRRE, Hextile, RichCursor,
//! XCursor, CursorPos).

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::pixel_format::Converter;
use crate::protocol::Encoding;
use crate::transport::Transport;
use crate::types::{PaintEvent, Rect};

/// What a single server-to-client message produced. Everything that
/// isn't a `FramebufferUpdate` carries no paint events, per `spec.md`
/// §4.5 ("No event emitted" for `SetColourMapEntries`, `Bell`,
/// `ServerCutText`).
pub enum Dispatch {
    FramebufferUpdate(Vec<PaintEvent>),
    Ignored,
}

fn read_u8<T: Transport + ?Sized>(t: &mut T) -> Result<u8> {
    Ok(t.recv(1)?[0])
}

fn read_u16<T: Transport + ?Sized>(t: &mut T) -> Result<u16> {
    Ok(BigEndian::read_u16(&t.recv(2)?))
}

fn read_u32<T: Transport + ?Sized>(t: &mut T) -> Result<u32> {
    Ok(BigEndian::read_u32(&t.recv(4)?))
}

fn read_i32<T: Transport + ?Sized>(t: &mut T) -> Result<i32> {
    Ok(BigEndian::read_i32(&t.recv(4)?))
}

/// Reads and dispatches exactly one server-to-client message
/// (`spec.md` §4.5 top-level dispatcher).
pub fn read_message<T: Transport + ?Sized>(
    transport: &mut T,
    converter: &Converter,
    bytes_per_pixel: usize,
) -> Result<Dispatch> {
    let message_type = read_u8(transport)?;
    read_prefixed_message(transport, message_type, converter, bytes_per_pixel)
}

/// Like [`read_message`], but the message-type byte has already been read
/// off the transport (the session loop's poll reads it as the first byte
/// of a bounded-time `recv_with_timeout`, before it knows a full message
/// is available).
pub fn read_prefixed_message<T: Transport + ?Sized>(
    transport: &mut T,
    message_type: u8,
    converter: &Converter,
    bytes_per_pixel: usize,
) -> Result<Dispatch> {
    match message_type {
        0x00 => {
            transport.recv(1)?; // padding
            let nrects = read_u16(transport)?;
            let mut events = Vec::new();
            for _ in 0..nrects {
                decode_rectangle(transport, converter, bytes_per_pixel, &mut events)?;
            }
            Ok(Dispatch::FramebufferUpdate(events))
        }
        0x01 => {
            transport.recv(1)?; // padding
            read_u16(transport)?; // first_colour, unused
            let ncolours = read_u16(transport)?;
            transport.recv(6 * ncolours as usize)?;
            Ok(Dispatch::Ignored)
        }
        0x02 => Ok(Dispatch::Ignored),
        0x03 => {
            transport.recv(3)?; // padding
            let length = read_u32(transport)?;
            transport.recv(length as usize)?;
            Ok(Dispatch::Ignored)
        }
        other => Err(Error::protocol(format!(
            "unrecognized server-to-client message type {other}"
        ))),
    }
}

fn decode_rectangle<T: Transport + ?Sized>(
    transport: &mut T,
    converter: &Converter,
    bytes_per_pixel: usize,
    events: &mut Vec<PaintEvent>,
) -> Result<()> {
    let x = read_u16(transport)?;
    let y = read_u16(transport)?;
    let width = read_u16(transport)?;
    let height = read_u16(transport)?;
    let tag = read_i32(transport)?;
    let rect = Rect::new(x, y, width, height);

    match Encoding::from_tag(tag) {
        Encoding::Raw => decode_raw(transport, converter, bytes_per_pixel, rect, events),
        Encoding::Rre => decode_rre(transport, converter, bytes_per_pixel, rect, events, false),
        Encoding::CoRre => decode_rre(transport, converter, bytes_per_pixel, rect, events, true),
        Encoding::Hextile => decode_hextile(transport, converter, bytes_per_pixel, rect, events),
        Encoding::RichCursor => decode_rich_cursor(transport, converter, bytes_per_pixel, rect, events),
        Encoding::XCursor => decode_xcursor(transport, rect, events),
        Encoding::CursorPos => {
            events.push(PaintEvent::CursorPos { x, y });
            Ok(())
        }
        Encoding::CopyRect | Encoding::Zrle => Err(Error::Unsupported(tag)),
        Encoding::Unknown(_) => Err(Error::protocol(format!("unrecognized rectangle encoding {tag}"))),
    }
}

fn decode_raw<T: Transport + ?Sized>(
    transport: &mut T,
    converter: &Converter,
    bytes_per_pixel: usize,
    rect: Rect,
    events: &mut Vec<PaintEvent>,
) -> Result<()> {
    let n = rect.width as usize * rect.height as usize * bytes_per_pixel;
    let data = transport.recv(n)?;
    events.push(PaintEvent::Pixels {
        rect,
        rgb: converter.convert_pixels(&data),
    });
    Ok(())
}

/// RRE and CoRRE share everything but the subrectangle coordinate width:
/// RRE uses four `u16`s, CoRRE four `u8`s (`spec.md` §4.5, Open Question
/// "CoRRE subrect field width").
fn decode_rre<T: Transport + ?Sized>(
    transport: &mut T,
    converter: &Converter,
    bytes_per_pixel: usize,
    rect: Rect,
    events: &mut Vec<PaintEvent>,
    narrow_coords: bool,
) -> Result<()> {
    let nsubrects = read_u32(transport)?;
    let bg = transport.recv(bytes_per_pixel)?;
    events.push(PaintEvent::Solid {
        rect,
        color: converter.convert_color1(&bg),
    });
    for _ in 0..nsubrects {
        let fg = transport.recv(bytes_per_pixel)?;
        let (sx, sy, sw, sh) = if narrow_coords {
            let bytes = transport.recv(4)?;
            (bytes[0] as u16, bytes[1] as u16, bytes[2] as u16, bytes[3] as u16)
        } else {
            (
                read_u16(transport)?,
                read_u16(transport)?,
                read_u16(transport)?,
                read_u16(transport)?,
            )
        };
        if sw == 0 || sh == 0 {
            // Open Question: a zero-sized subrect is a no-op.
            continue;
        }
        events.push(PaintEvent::Solid {
            rect: Rect::new(rect.x + sx, rect.y + sy, sw, sh),
            color: converter.convert_color1(&fg),
        });
    }
    Ok(())
}

const HEXTILE_TILE: u16 = 16;

fn decode_hextile<T: Transport + ?Sized>(
    transport: &mut T,
    converter: &Converter,
    bytes_per_pixel: usize,
    rect: Rect,
    events: &mut Vec<PaintEvent>,
) -> Result<()> {
    let mut bg: Option<Vec<u8>> = None;
    let mut fg: Option<Vec<u8>> = None;

    let mut ty = 0u16;
    while ty < rect.height {
        let th = HEXTILE_TILE.min(rect.height - ty);
        let mut tx = 0u16;
        while tx < rect.width {
            let tw = HEXTILE_TILE.min(rect.width - tx);
            let tile_rect = Rect::new(rect.x + tx, rect.y + ty, tw, th);

            let c = read_u8(transport)?;
            if c >= 32 {
                return Err(Error::protocol(format!("hextile subencoding {c} >= 32")));
            }

            if c & 1 != 0 {
                // Raw short-circuits everything else in the byte.
                let n = tw as usize * th as usize * bytes_per_pixel;
                let data = transport.recv(n)?;
                events.push(PaintEvent::Pixels {
                    rect: tile_rect,
                    rgb: converter.convert_pixels(&data),
                });
                tx += tw;
                continue;
            }
            if c & 2 != 0 {
                bg = Some(transport.recv(bytes_per_pixel)?);
            }
            if c & 4 != 0 {
                fg = Some(transport.recv(bytes_per_pixel)?);
            }
            let bg_bytes = bg
                .as_ref()
                .ok_or_else(|| Error::protocol("hextile tile has no background colour yet"))?;
            events.push(PaintEvent::Solid {
                rect: tile_rect,
                color: converter.convert_color1(bg_bytes),
            });

            if c & 8 == 0 {
                tx += tw;
                continue;
            }
            let nsub = read_u8(transport)?;
            let coloured = c & 16 != 0;
            for _ in 0..nsub {
                let colour_bytes = if coloured {
                    transport.recv(bytes_per_pixel)?
                } else {
                    fg.clone()
                        .ok_or_else(|| Error::protocol("hextile subrect has no foreground colour"))?
                };
                let packed = transport.recv(2)?;
                let (xy, wh) = (packed[0], packed[1]);
                let sx = xy >> 4;
                let sy = xy & 0x0f;
                let sw = (wh >> 4) + 1;
                let sh = (wh & 0x0f) + 1;
                if sx as u16 + sw as u16 > tw || sy as u16 + sh as u16 > th {
                    return Err(Error::protocol("hextile subrect exceeds tile bounds"));
                }
                events.push(PaintEvent::Solid {
                    rect: Rect::new(
                        tile_rect.x + sx as u16,
                        tile_rect.y + sy as u16,
                        sw as u16,
                        sh as u16,
                    ),
                    color: converter.convert_color1(&colour_bytes),
                });
            }
            tx += tw;
        }
        ty += th;
    }
    Ok(())
}

/// Extracts bit `i` (0 = leftmost) of an MSB-first-packed row, where `b`
/// is the byte containing it (`spec.md` §4.5 "Mask bit extraction").
fn mask_bit(b: u8, i: usize) -> bool {
    (b >> (7 - (i & 7))) & 1 != 0
}

/// Unpacks a `rowbytes * height` MSB-first bitmap into one `bool` per
/// pixel, dropping the row padding past `width` bits.
fn unpack_mask(mask: &[u8], width: u16, height: u16) -> Vec<bool> {
    let rowbytes = (width as usize + 7) / 8;
    let mut bits = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height as usize {
        let row_bytes = &mask[row * rowbytes..(row + 1) * rowbytes];
        for col in 0..width as usize {
            bits.push(mask_bit(row_bytes[col / 8], col % 8));
        }
    }
    bits
}

fn decode_rich_cursor<T: Transport + ?Sized>(
    transport: &mut T,
    converter: &Converter,
    bytes_per_pixel: usize,
    rect: Rect,
    events: &mut Vec<PaintEvent>,
) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }
    let pixel_count = rect.width as usize * rect.height as usize;
    let pixel_data = transport.recv(pixel_count * bytes_per_pixel)?;
    let rowbytes = (rect.width as usize + 7) / 8;
    let mask_data = transport.recv(rowbytes * rect.height as usize)?;

    let rgb = converter.convert_pixels(&pixel_data);
    let mask = unpack_mask(&mask_data, rect.width, rect.height);

    let mut rgba = Vec::with_capacity(pixel_count * 4);
    for i in 0..pixel_count {
        if mask[i] {
            rgba.push(0xFF);
            rgba.extend_from_slice(&rgb[i * 3..i * 3 + 3]);
        } else {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
        }
    }
    events.push(PaintEvent::CursorImage {
        width: rect.width,
        height: rect.height,
        hotspot_x: rect.x,
        hotspot_y: rect.y,
        rgba,
    });
    Ok(())
}

fn decode_xcursor<T: Transport + ?Sized>(
    transport: &mut T,
    rect: Rect,
    events: &mut Vec<PaintEvent>,
) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }
    let fg = transport.recv(3)?;
    let bg = transport.recv(3)?;
    let rowbytes = (rect.width as usize + 7) / 8;
    let plane_len = rowbytes * rect.height as usize;
    let data_bits = unpack_mask(&transport.recv(plane_len)?, rect.width, rect.height);
    let mask_bits = unpack_mask(&transport.recv(plane_len)?, rect.width, rect.height);

    let pixel_count = rect.width as usize * rect.height as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);
    for i in 0..pixel_count {
        if !mask_bits[i] {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
        } else if data_bits[i] {
            rgba.push(0xFF);
            rgba.extend_from_slice(&fg);
        } else {
            rgba.push(0xFF);
            rgba.extend_from_slice(&bg);
        }
    }
    events.push(PaintEvent::CursorImage {
        width: rect.width,
        height: rect.height,
        hotspot_x: rect.x,
        hotspot_y: rect.y,
        rgba,
    });
    Ok(())
}
