//! Error kinds surfaced by the handshake, decoder, and session loop.
//!
//! `Timeout` from `spec.md` §7 is deliberately not a variant here — a recv
//! timeout is not an error, so it is represented as `Ok(None)` at the
//! transport layer instead of `Err(Error::Timeout)`.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transport closed mid-message. Fatal to the current session; the
    /// caller may reconnect.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Handshake rejected credentials, or the server refused a security
    /// type. Fatal, never retried by the session loop.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Server-declared pixel format cannot be converted to canonical RGB.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// An encoding tag that is recognized but explicitly not implemented
    /// (CopyRect, ZRLE). A tag outside the recognized set entirely is a
    /// `ProtocolError` instead, not this.
    #[error("unsupported encoding: {0}")]
    Unsupported(i32),

    /// Malformed message: bad version string, bad Hextile subencoding,
    /// an out-of-range rectangle, and so on.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Clean EOF while replaying a capture file. Caught by the session
    /// loop and converted to normal termination with a final frame flush;
    /// only escapes to a caller driving the transport directly.
    #[error("end of capture file")]
    EndOfStream,

    /// Anything else from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Error {
        Error::ProtocolError(msg.into())
    }
}

/// Outcome of a bounded-time receive: either the requested bytes, or a
/// timeout that the session loop should treat as "nothing happened yet".
#[derive(Debug)]
pub enum RecvOutcome {
    Ready(Vec<u8>),
    Timeout,
}

impl fmt::Display for RecvOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvOutcome::Ready(bytes) => write!(f, "Ready({} bytes)", bytes.len()),
            RecvOutcome::Timeout => write!(f, "Timeout"),
        }
    }
}
