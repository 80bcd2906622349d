//! RFB handshake and authentication state machine (`spec.md` §4.3).
//!
//! Drives: `Greet -> Security -> [VncAuth] -> Result -> ServerInit`, then
//! sends `SetPixelFormat` and `SetEncodings` before handing off to the
//! session loop.

use std::fs;

use log::debug;

use crate::auth;
use crate::config::{ClientConfig, PasswordSource};
use crate::error::{Error, Result};
use crate::pixel_format::Converter;
use crate::protocol::{
    C2S, ClientInit, Message, PixelFormat, SecurityType, SecurityTypes, ServerInit, Version,
};
use crate::transport::Transport;

/// Everything the session loop needs once the handshake completes
/// (`spec.md` §3 "Session").
pub struct Handshaken {
    pub protocol_version: Version,
    pub server_init: ServerInit,
    pub converter: Converter,
    pub bytes_per_pixel: usize,
    /// The password that authenticated, cached for a future reconnect.
    pub password_cache: Option<Vec<u8>>,
}

fn read_password(source: &mut PasswordSource) -> Result<Vec<u8>> {
    match source {
        PasswordSource::Cached(bytes) => Ok(bytes.clone()),
        PasswordSource::File(path) => {
            let blob = fs::read(path)?;
            auth::decrypt_password_file(&blob)
        }
        PasswordSource::Prompt(prompt) => Ok(prompt()),
    }
}

fn greet<T: Transport>(transport: &mut T) -> Result<Version> {
    let version = Version::read_from(&mut TransportReader(transport))?;
    debug!("<- Version::{:?}", version);
    // We never offer a *higher* version than what the server announced;
    // the server controls which of 3.3/3.7/3.8 is in play.
    version.write_to(&mut TransportWriter(transport))?;
    debug!("-> Version::{:?}", version);
    Ok(version)
}

/// Runs the `VncAuth` branch: obtain a password, exchange a 16-byte DES
/// challenge/response, and return the server's result code.
fn vnc_auth<T: Transport>(
    transport: &mut T,
    config: &mut ClientConfig,
    password_cache: &mut Option<Vec<u8>>,
) -> Result<u32> {
    let password = if let Some(cached) = password_cache.clone() {
        cached
    } else {
        let password = read_password(&mut config.password_source)?;
        *password_cache = Some(password.clone());
        password
    };
    let challenge_bytes = transport.recv(16)?;
    let challenge: [u8; 16] = challenge_bytes
        .try_into()
        .map_err(|_| Error::protocol("challenge was not 16 bytes"))?;
    let response = auth::challenge_response(&password, &challenge);
    transport.send(&response)?;
    let result_bytes = transport.recv(4)?;
    Ok(u32::from_be_bytes(result_bytes.try_into().unwrap()))
}

fn read_failure_reason<T: Transport>(transport: &mut T) -> Result<String> {
    String::read_from(&mut TransportReader(transport))
}

/// `Security` + `VncAuth` + `Result` states collapsed into one function,
/// since which sub-states run depends on `version` and the server's
/// offered security types.
fn negotiate_security<T: Transport>(
    transport: &mut T,
    version: Version,
    config: &mut ClientConfig,
    password_cache: &mut Option<Vec<u8>>,
) -> Result<()> {
    match version {
        Version::Rfb33 => {
            let security_bytes = transport.recv(4)?;
            let security = u32::from_be_bytes(security_bytes.try_into().unwrap());
            debug!("<- security (3.3): {}", security);
            match security {
                0 => {
                    let reason = read_failure_reason(transport)?;
                    Err(Error::AuthError(reason))
                }
                1 => Ok(()),
                2 => {
                    let result = vnc_auth(transport, config, password_cache)?;
                    if result != 0 {
                        Err(Error::AuthError(String::new()))
                    } else {
                        Ok(())
                    }
                }
                other => Err(Error::protocol(format!(
                    "unknown 3.3 security type {other}"
                ))),
            }
        }
        Version::Rfb37 | Version::Rfb38 => {
            let types = SecurityTypes::read_from(&mut TransportReader(transport))?;
            debug!("<- {:?}", types);
            if types.0.is_empty() {
                let reason = read_failure_reason(transport)?;
                return Err(Error::AuthError(reason));
            }
            if types.0.contains(&SecurityType::None) {
                SecurityType::None.write_to(&mut TransportWriter(transport))?;
                if version == Version::Rfb38 {
                    let result_bytes = transport.recv(4)?;
                    let result = u32::from_be_bytes(result_bytes.try_into().unwrap());
                    if result != 0 {
                        let reason = read_failure_reason(transport)?;
                        return Err(Error::AuthError(reason));
                    }
                }
                Ok(())
            } else if types.0.contains(&SecurityType::VncAuthentication) {
                SecurityType::VncAuthentication.write_to(&mut TransportWriter(transport))?;
                let result = vnc_auth(transport, config, password_cache)?;
                if result != 0 {
                    let reason = read_failure_reason(transport)?;
                    return Err(Error::AuthError(reason));
                }
                Ok(())
            } else {
                Err(Error::protocol("server offered no usable security type"))
            }
        }
    }
}

/// Runs the full state machine of `spec.md` §4.3, from `Greet` through
/// `SetPixelFormat`/`SetEncodings`, and returns everything the session
/// loop needs to start requesting updates.
pub fn perform<T: Transport>(transport: &mut T, config: &mut ClientConfig) -> Result<Handshaken> {
    let version = greet(transport)?;

    let mut password_cache = config.password_source.cached_bytes();
    negotiate_security(transport, version, config, &mut password_cache)?;

    ClientInit { shared: true }.write_to(&mut TransportWriter(transport))?;
    let server_init = ServerInit::read_from(&mut TransportReader(transport))?;
    debug!("<- {:?}", server_init);

    let want_canonical = server_init.pixel_format != PixelFormat::canonical();
    let format_to_use = if want_canonical {
        PixelFormat::canonical()
    } else {
        server_init.pixel_format
    };
    C2S::SetPixelFormat(format_to_use).write_to(&mut TransportWriter(transport))?;

    let mut encodings: Vec<_> = config
        .preferred_encodings
        .iter()
        .map(|&tag| crate::protocol::Encoding::from_tag(tag))
        .collect();
    if config.include_cursor {
        encodings.push(crate::protocol::Encoding::RichCursor);
        encodings.push(crate::protocol::Encoding::CursorPos);
    }
    C2S::SetEncodings(encodings).write_to(&mut TransportWriter(transport))?;

    let converter = Converter::build(&format_to_use)?;
    let bytes_per_pixel = format_to_use.bytes_per_pixel();

    Ok(Handshaken {
        protocol_version: version,
        server_init: ServerInit {
            pixel_format: format_to_use,
            ..server_init
        },
        converter,
        bytes_per_pixel,
        password_cache,
    })
}

/// Adapters so `Message::read_from`/`write_to` (which take `std::io::Read`
/// / `Write`) can drive a [`Transport`], which speaks in whole-buffer
/// `recv`/`send` calls instead.
struct TransportReader<'a, T: Transport>(&'a mut T);

impl<'a, T: Transport> std::io::Read for TransportReader<'a, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let data = self
            .0
            .recv(buf.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        buf.copy_from_slice(&data);
        Ok(data.len())
    }
}

struct TransportWriter<'a, T: Transport>(&'a mut T);

impl<'a, T: Transport> std::io::Write for TransportWriter<'a, T> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::RecvOutcome;
    use std::time::Duration;

    /// An in-memory transport driven by a scripted inbound byte stream
    /// (`spec.md` §A.4 test tooling).
    struct ScriptedTransport {
        inbound: std::io::Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(inbound: Vec<u8>) -> Self {
            ScriptedTransport {
                inbound: std::io::Cursor::new(inbound),
                outbound: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn recv(&mut self, n: usize) -> Result<Vec<u8>> {
            use std::io::Read;
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

    /// Scenario 1 (`spec.md` §8): v3.3 None-auth handshake.
    #[test]
    fn v33_none_auth_handshake() {
        let mut script = Vec::new();
        script.extend_from_slice(b"RFB 003.003\n");
        script.extend_from_slice(&1u32.to_be_bytes()); // security = None
        script.extend_from_slice(&640u16.to_be_bytes());
        script.extend_from_slice(&480u16.to_be_bytes());
        let format = PixelFormat::canonical();
        format.write_to(&mut script).unwrap();
        let name = String::from("x");
        name.write_to(&mut script).unwrap();

        let mut transport = ScriptedTransport::new(script);
        let mut config = ClientConfig::file("unused.vnclog".into());
        config.preferred_encodings = vec![0, 5];

        let handshaken = perform(&mut transport, &mut config).unwrap();
        assert_eq!(handshaken.protocol_version, Version::Rfb33);
        assert_eq!(handshaken.server_init.framebuffer_width, 640);
        assert_eq!(handshaken.server_init.framebuffer_height, 480);
        assert_eq!(handshaken.server_init.name, "x");

        // Client must have sent: ClientInit, SetPixelFormat, SetEncodings.
        assert_eq!(transport.outbound[0], 1); // ClientInit shared=1
    }

    /// Scenario 2 (`spec.md` §8): v3.8 VncAuth failure.
    #[test]
    fn v38_vnc_auth_failure() {
        let mut script = Vec::new();
        script.extend_from_slice(b"RFB 003.008\n");
        script.push(1); // one security type offered
        script.push(2); // VncAuthentication
        script.extend_from_slice(&[0u8; 16]); // challenge
        // VncAuth always reads challenge -> writes response -> reads
        // result, so the failure result + reason directly follow the
        // challenge in the script regardless of what the client sends.
        script.extend_from_slice(&1u32.to_be_bytes()); // result = failed
        script.extend_from_slice(&5u32.to_be_bytes()); // reason length
        script.extend_from_slice(b"nope!");

        let mut transport = ScriptedTransport::new(script);
        let mut config = ClientConfig::file("unused.vnclog".into());
        config.password_source = PasswordSource::Cached(b"secret".to_vec());

        let err = perform(&mut transport, &mut config).unwrap_err();
        match err {
            Error::AuthError(reason) => assert_eq!(reason, "nope!"),
            other => panic!("expected AuthError, got {other:?}"),
        }
    }
}
