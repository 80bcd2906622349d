//! Wire-format types shared by the handshake and the rectangle decoder.
//!
//! Every type here implements [`Message`], the teacher's own pattern for
//! symmetric `read_from`/`write_to` pairs keyed off `byteorder`. All
//! multi-byte integers are big-endian per `spec.md` §6.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

pub trait Message {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self>
    where
        Self: Sized;
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()>;
}

impl Message for String {
    fn read_from<R: Read>(reader: &mut R) -> Result<String> {
        let length = reader.read_u32::<BigEndian>()?;
        let mut bytes = vec![0u8; length as usize];
        reader.read_exact(&mut bytes)?;
        // RFB strings are Latin-1; every byte maps onto a Unicode scalar.
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes: Vec<u8> = self.chars().map(|c| c as u8).collect();
        writer.write_u32::<BigEndian>(bytes.len() as u32)?;
        writer.write_all(&bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Rfb33,
    Rfb37,
    Rfb38,
}

impl Message for Version {
    fn read_from<R: Read>(reader: &mut R) -> Result<Version> {
        let mut buf = [0u8; 12];
        reader.read_exact(&mut buf)?;
        match &buf {
            b"RFB 003.003\n" => Ok(Version::Rfb33),
            b"RFB 003.007\n" => Ok(Version::Rfb37),
            b"RFB 003.008\n" => Ok(Version::Rfb38),
            // Apple Remote Desktop reports this but behaves like 3.8.
            b"RFB 003.889\n" => Ok(Version::Rfb38),
            _ => Err(Error::protocol("unrecognized protocol version string")),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let text: &[u8] = match self {
            Version::Rfb33 => b"RFB 003.003\n",
            Version::Rfb37 => b"RFB 003.007\n",
            Version::Rfb38 => b"RFB 003.008\n",
        };
        writer.write_all(text)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    Invalid,
    None,
    VncAuthentication,
    Unknown(u8),
}

impl SecurityType {
    fn from_byte(b: u8) -> SecurityType {
        match b {
            0 => SecurityType::Invalid,
            1 => SecurityType::None,
            2 => SecurityType::VncAuthentication,
            n => SecurityType::Unknown(n),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            SecurityType::Invalid => 0,
            SecurityType::None => 1,
            SecurityType::VncAuthentication => 2,
            SecurityType::Unknown(n) => n,
        }
    }
}

impl Message for SecurityType {
    fn read_from<R: Read>(reader: &mut R) -> Result<SecurityType> {
        Ok(SecurityType::from_byte(reader.read_u8()?))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.to_byte())?;
        Ok(())
    }
}

/// The list of security types offered by a 3.7/3.8 server.
#[derive(Debug)]
pub struct SecurityTypes(pub Vec<SecurityType>);

impl Message for SecurityTypes {
    fn read_from<R: Read>(reader: &mut R) -> Result<SecurityTypes> {
        let count = reader.read_u8()?;
        let mut types = Vec::with_capacity(count as usize);
        for _ in 0..count {
            types.push(SecurityType::read_from(reader)?);
        }
        Ok(SecurityTypes(types))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.0.len() as u8)?;
        for t in &self.0 {
            t.write_to(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ClientInit {
    pub shared: bool,
}

impl Message for ClientInit {
    fn read_from<R: Read>(reader: &mut R) -> Result<ClientInit> {
        Ok(ClientInit {
            shared: reader.read_u8()? != 0,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(if self.shared { 1 } else { 0 })?;
        Ok(())
    }
}

/// Server's wire pixel layout (`spec.md` §3 "PixelFormat").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The client's preferred format: 32bpp, depth 8, big-endian,
    /// true-colour, 255 max, shifts 24/16/8 — chosen so conversion is a
    /// no-op on the fast path (`spec.md` §3 "CanonicalFormat").
    pub fn canonical() -> PixelFormat {
        PixelFormat {
            bits_per_pixel: 32,
            depth: 8,
            big_endian: true,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 24,
            green_shift: 16,
            blue_shift: 8,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }
}

impl Message for PixelFormat {
    fn read_from<R: Read>(reader: &mut R) -> Result<PixelFormat> {
        let format = PixelFormat {
            bits_per_pixel: reader.read_u8()?,
            depth: reader.read_u8()?,
            big_endian: reader.read_u8()? != 0,
            true_colour: reader.read_u8()? != 0,
            red_max: reader.read_u16::<BigEndian>()?,
            green_max: reader.read_u16::<BigEndian>()?,
            blue_max: reader.read_u16::<BigEndian>()?,
            red_shift: reader.read_u8()?,
            green_shift: reader.read_u8()?,
            blue_shift: reader.read_u8()?,
        };
        let mut padding = [0u8; 3];
        reader.read_exact(&mut padding)?;
        Ok(format)
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.bits_per_pixel)?;
        writer.write_u8(self.depth)?;
        writer.write_u8(if self.big_endian { 1 } else { 0 })?;
        writer.write_u8(if self.true_colour { 1 } else { 0 })?;
        writer.write_u16::<BigEndian>(self.red_max)?;
        writer.write_u16::<BigEndian>(self.green_max)?;
        writer.write_u16::<BigEndian>(self.blue_max)?;
        writer.write_u8(self.red_shift)?;
        writer.write_u8(self.green_shift)?;
        writer.write_u8(self.blue_shift)?;
        writer.write_all(&[0u8; 3])?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl Message for ServerInit {
    fn read_from<R: Read>(reader: &mut R) -> Result<ServerInit> {
        Ok(ServerInit {
            framebuffer_width: reader.read_u16::<BigEndian>()?,
            framebuffer_height: reader.read_u16::<BigEndian>()?,
            pixel_format: PixelFormat::read_from(reader)?,
            name: String::read_from(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.framebuffer_width)?;
        writer.write_u16::<BigEndian>(self.framebuffer_height)?;
        self.pixel_format.write_to(writer)?;
        self.name.write_to(writer)?;
        Ok(())
    }
}

/// Encoding tags the decoder knows about (`spec.md` §3 "Rectangle").
/// `CopyRect` and `Zrle` are recognized purely so they can fail with a
/// precise `Error::Unsupported` rather than falling through to
/// `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    CopyRect,
    Rre,
    CoRre,
    Hextile,
    Zrle,
    RichCursor,
    XCursor,
    CursorPos,
    Unknown(i32),
}

impl Encoding {
    pub fn tag(self) -> i32 {
        match self {
            Encoding::Raw => 0,
            Encoding::CopyRect => 1,
            Encoding::Rre => 2,
            Encoding::CoRre => 4,
            Encoding::Hextile => 5,
            Encoding::Zrle => 16,
            Encoding::RichCursor => -239,
            Encoding::XCursor => -240,
            Encoding::CursorPos => -232,
            Encoding::Unknown(n) => n,
        }
    }

    pub fn from_tag(tag: i32) -> Encoding {
        match tag {
            0 => Encoding::Raw,
            1 => Encoding::CopyRect,
            2 => Encoding::Rre,
            4 => Encoding::CoRre,
            5 => Encoding::Hextile,
            16 => Encoding::Zrle,
            -239 => Encoding::RichCursor,
            -240 => Encoding::XCursor,
            -232 => Encoding::CursorPos,
            n => Encoding::Unknown(n),
        }
    }
}

impl Message for Encoding {
    fn read_from<R: Read>(reader: &mut R) -> Result<Encoding> {
        Ok(Encoding::from_tag(reader.read_i32::<BigEndian>()?))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(self.tag())?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct RectangleHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: Encoding,
}

impl Message for RectangleHeader {
    fn read_from<R: Read>(reader: &mut R) -> Result<RectangleHeader> {
        Ok(RectangleHeader {
            x: reader.read_u16::<BigEndian>()?,
            y: reader.read_u16::<BigEndian>()?,
            width: reader.read_u16::<BigEndian>()?,
            height: reader.read_u16::<BigEndian>()?,
            encoding: Encoding::read_from(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.x)?;
        writer.write_u16::<BigEndian>(self.y)?;
        writer.write_u16::<BigEndian>(self.width)?;
        writer.write_u16::<BigEndian>(self.height)?;
        self.encoding.write_to(writer)?;
        Ok(())
    }
}

/// Client-to-server messages this crate sends. The view-only scope
/// (`spec.md` §1 Non-goals) means there is no `KeyEvent`/`PointerEvent`
/// here — only the three messages a passive viewer needs.
#[derive(Debug)]
pub enum C2S {
    SetPixelFormat(PixelFormat),
    SetEncodings(Vec<Encoding>),
    FramebufferUpdateRequest {
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },
}

impl Message for C2S {
    fn read_from<R: Read>(_reader: &mut R) -> Result<C2S> {
        unimplemented!("this crate is a view-only client; it never parses C2S messages")
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            C2S::SetPixelFormat(format) => {
                writer.write_u8(0)?;
                writer.write_all(&[0u8; 3])?;
                format.write_to(writer)?;
            }
            C2S::SetEncodings(encodings) => {
                writer.write_u8(2)?;
                writer.write_all(&[0u8; 1])?;
                writer.write_u16::<BigEndian>(encodings.len() as u16)?;
                for encoding in encodings {
                    encoding.write_to(writer)?;
                }
            }
            C2S::FramebufferUpdateRequest {
                incremental,
                x,
                y,
                width,
                height,
            } => {
                writer.write_u8(3)?;
                writer.write_u8(if *incremental { 1 } else { 0 })?;
                writer.write_u16::<BigEndian>(*x)?;
                writer.write_u16::<BigEndian>(*y)?;
                writer.write_u16::<BigEndian>(*width)?;
                writer.write_u16::<BigEndian>(*height)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn version_round_trip() {
        for v in [Version::Rfb33, Version::Rfb37, Version::Rfb38] {
            let mut buf = Vec::new();
            v.write_to(&mut buf).unwrap();
            let mut cursor = Cursor::new(buf);
            assert_eq!(Version::read_from(&mut cursor).unwrap(), v);
        }
    }

    #[test]
    fn canonical_format_is_32bpp_rgbx() {
        let fmt = PixelFormat::canonical();
        assert_eq!(fmt.bits_per_pixel, 32);
        assert_eq!(fmt.bytes_per_pixel(), 4);
        assert_eq!((fmt.red_shift, fmt.green_shift, fmt.blue_shift), (24, 16, 8));
    }

    #[test]
    fn encoding_tag_round_trip() {
        let tags = [0, 1, 2, 4, 5, 16, -239, -240, -232, 99];
        for &tag in &tags {
            assert_eq!(Encoding::from_tag(tag).tag(), tag);
        }
    }
}
