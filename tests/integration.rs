//! Cross-module scenarios: a full handshake followed by a
//! `FramebufferUpdate` containing a mix of encodings, decoded through the
//! public API the way a real consumer would.

use std::io::{Cursor, Read};
use std::time::Duration;

use rfb_client::transport::Transport;
use rfb_client::{ClientConfig, Error, PixelFormat, RecvOutcome, Result, Version};

struct ScriptedTransport {
    inbound: Cursor<Vec<u8>>,
    outbound: Vec<u8>,
}

impl ScriptedTransport {
    fn new(inbound: Vec<u8>) -> Self {
        ScriptedTransport {
            inbound: Cursor::new(inbound),
            outbound: Vec::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inbound
            .read_exact(&mut buf)
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(buf)
    }

    fn recv_with_timeout(&mut self, n: usize, _dt: Duration) -> Result<RecvOutcome> {
        self.recv(n).map(RecvOutcome::Ready)
    }

    fn send(&mut self, buf: &[u8]) -> Result<()> {
        self.outbound.extend_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) {}
}

fn v33_none_auth_script(server_init_bytes: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    script.extend_from_slice(b"RFB 003.003\n");
    script.extend_from_slice(&1u32.to_be_bytes()); // security = None
    script.extend_from_slice(server_init_bytes);
    script
}

fn server_init_bytes(width: u16, height: u16, name: &str, format: PixelFormat) -> Vec<u8> {
    use rfb_client::protocol::Message;
    let mut buf = Vec::new();
    buf.extend_from_slice(&width.to_be_bytes());
    buf.extend_from_slice(&height.to_be_bytes());
    format.write_to(&mut buf).unwrap();
    name.to_string().write_to(&mut buf).unwrap();
    buf
}

/// A Raw rectangle fully round-trips through handshake + decoder with the
/// canonical format, and `rgb.len() == 3 * width * height` holds.
#[test]
fn raw_rectangle_round_trip_through_handshake_and_decoder() {
    let init = server_init_bytes(100, 80, "scenario", PixelFormat::canonical());
    let mut script = v33_none_auth_script(&init);

    // One FramebufferUpdate: a single 4x4 Raw rectangle.
    script.push(0x00);
    script.push(0);
    script.extend_from_slice(&1u16.to_be_bytes());
    script.extend_from_slice(&0u16.to_be_bytes());
    script.extend_from_slice(&0u16.to_be_bytes());
    script.extend_from_slice(&4u16.to_be_bytes());
    script.extend_from_slice(&4u16.to_be_bytes());
    script.extend_from_slice(&0i32.to_be_bytes());
    for _ in 0..(4 * 4) {
        script.extend_from_slice(&[9, 8, 7, 0]);
    }

    let mut transport = ScriptedTransport::new(script);
    let mut config = ClientConfig::tcp("unused", 0).with_encodings(vec![0, 2, 4, 5]);

    let handshaken = rfb_client::handshake::perform(&mut transport, &mut config).unwrap();
    assert_eq!(handshaken.protocol_version, Version::Rfb33);
    assert_eq!(handshaken.server_init.framebuffer_width, 100);

    match rfb_client::decoder::read_message(&mut transport, &handshaken.converter, handshaken.bytes_per_pixel).unwrap() {
        rfb_client::decoder::Dispatch::FramebufferUpdate(events) => {
            assert_eq!(events.len(), 1);
            match &events[0] {
                rfb_client::PaintEvent::Pixels { rect, rgb } => {
                    assert_eq!(rect.width, 4);
                    assert_eq!(rect.height, 4);
                    assert_eq!(rgb.len(), 3 * rect.width as usize * rect.height as usize);
                }
                other => panic!("expected Pixels, got {other:?}"),
            }
        }
        rfb_client::decoder::Dispatch::Ignored => panic!("expected an update"),
    }

    // Client must have sent ClientInit + SetPixelFormat + SetEncodings.
    assert!(!transport.outbound.is_empty());
}

/// Building a converter twice from the same server format is idempotent
/// (`spec.md` §8).
#[test]
fn format_negotiation_is_idempotent() {
    let format = PixelFormat {
        bits_per_pixel: 16,
        depth: 16,
        big_endian: false,
        true_colour: true,
        red_max: 31,
        green_max: 63,
        blue_max: 31,
        red_shift: 11,
        green_shift: 5,
        blue_shift: 0,
    };
    let a = rfb_client::pixel_format::Converter::build(&format).unwrap();
    let b = rfb_client::pixel_format::Converter::build(&format).unwrap();
    let sample = [0xFFu8, 0xFF];
    assert_eq!(a.convert_color1(&sample), b.convert_color1(&sample));
}

/// A malformed Hextile subencoding byte (`c >= 32`) is a protocol error,
/// not a panic.
#[test]
fn hextile_subencoding_out_of_range_is_a_protocol_error() {
    let init = server_init_bytes(16, 16, "bad-tile", PixelFormat::canonical());
    let mut script = v33_none_auth_script(&init);
    script.push(0x00);
    script.push(0);
    script.extend_from_slice(&1u16.to_be_bytes());
    script.extend_from_slice(&0u16.to_be_bytes());
    script.extend_from_slice(&0u16.to_be_bytes());
    script.extend_from_slice(&16u16.to_be_bytes());
    script.extend_from_slice(&16u16.to_be_bytes());
    script.extend_from_slice(&5i32.to_be_bytes()); // Hextile
    script.push(32); // invalid subencoding

    let mut transport = ScriptedTransport::new(script);
    let mut config = ClientConfig::tcp("unused", 0);
    let handshaken = rfb_client::handshake::perform(&mut transport, &mut config).unwrap();

    let err = rfb_client::decoder::read_message(&mut transport, &handshaken.converter, handshaken.bytes_per_pixel)
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolError(_)));
}

/// CopyRect is recognized but always refused with a precise error.
#[test]
fn copy_rect_is_refused_not_silently_dropped() {
    let init = server_init_bytes(16, 16, "copyrect", PixelFormat::canonical());
    let mut script = v33_none_auth_script(&init);
    script.push(0x00);
    script.push(0);
    script.extend_from_slice(&1u16.to_be_bytes());
    script.extend_from_slice(&0u16.to_be_bytes());
    script.extend_from_slice(&0u16.to_be_bytes());
    script.extend_from_slice(&1u16.to_be_bytes());
    script.extend_from_slice(&1u16.to_be_bytes());
    script.extend_from_slice(&1i32.to_be_bytes()); // CopyRect tag

    let mut transport = ScriptedTransport::new(script);
    let mut config = ClientConfig::tcp("unused", 0);
    let handshaken = rfb_client::handshake::perform(&mut transport, &mut config).unwrap();

    let err = rfb_client::decoder::read_message(&mut transport, &handshaken.converter, handshaken.bytes_per_pixel)
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(1)));
}
