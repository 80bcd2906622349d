//! Caller configuration (`spec.md` §6 "Caller configuration").
//!
//! Modeled on the teacher's `ClientBuilder` (`src/lib.rs`), generalized to
//! the fields the spec enumerates rather than the encoding/feature flags
//! the original builder exposed.

use std::path::PathBuf;

use crate::types::Rect;

/// Where to get bytes from: a live server, or a capture file to replay.
#[derive(Debug, Clone)]
pub enum Target {
    Tcp { host: String, port: u16 },
    File { path: PathBuf },
}

/// How to obtain the VNC password, tried in the order the handshake
/// needs it: already-known bytes, an obfuscated password file, or an
/// interactive prompt. The core never renders the prompt itself — that's
/// the GUI shell's job (`spec.md` §1 Non-goals).
pub enum PasswordSource {
    Cached(Vec<u8>),
    File(PathBuf),
    Prompt(Box<dyn FnMut() -> Vec<u8>>),
}

impl std::fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordSource::Cached(_) => write!(f, "PasswordSource::Cached(..)"),
            PasswordSource::File(path) => write!(f, "PasswordSource::File({path:?})"),
            PasswordSource::Prompt(_) => write!(f, "PasswordSource::Prompt(..)"),
        }
    }
}

impl PasswordSource {
    /// Returns the password immediately if it's already known, without
    /// touching the filesystem or prompting — used to seed the session's
    /// password cache before the first `VncAuth` attempt.
    pub fn cached_bytes(&self) -> Option<Vec<u8>> {
        match self {
            PasswordSource::Cached(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }
}

/// Encoding tags as the caller names them in `preferred_encodings`
/// (`spec.md` §6): `{0, 2, 4, 5, -232, -239, -240}`.
pub type EncodingTag = i32;

/// All caller-supplied knobs enumerated in `spec.md` §6.
pub struct ClientConfig {
    pub target: Target,
    pub password_source: PasswordSource,
    pub preferred_encodings: Vec<EncodingTag>,
    pub include_cursor: bool,
    pub clipping: Option<Rect>,
    pub framerate: u32,
    pub debug_level: u8,
    pub reconnect: u32,
}

impl ClientConfig {
    /// A sensible starting point for connecting to a live server: Raw +
    /// Hextile preferred, no cursor tracking, full-screen clipping,
    /// 10fps, no reconnects.
    pub fn tcp(host: impl Into<String>, port: u16) -> ClientConfig {
        ClientConfig {
            target: Target::Tcp {
                host: host.into(),
                port,
            },
            password_source: PasswordSource::Cached(Vec::new()),
            preferred_encodings: vec![0, 2, 4, 5],
            include_cursor: false,
            clipping: None,
            framerate: 10,
            debug_level: 0,
            reconnect: 0,
        }
    }

    /// A starting point for replaying a capture file. Replay never
    /// authenticates for real (the file forges a `None`-security
    /// handshake per `spec.md` §6), but the password source is still
    /// wired up in case a capture records a `VncAuth` negotiation.
    pub fn file(path: PathBuf) -> ClientConfig {
        ClientConfig {
            target: Target::File { path },
            password_source: PasswordSource::Cached(Vec::new()),
            preferred_encodings: vec![0, 2, 4, 5],
            include_cursor: true,
            clipping: None,
            framerate: 10,
            debug_level: 0,
            reconnect: 0,
        }
    }

    pub fn with_encodings(mut self, encodings: Vec<EncodingTag>) -> ClientConfig {
        self.preferred_encodings = encodings;
        self
    }

    pub fn with_cursor(mut self, include: bool) -> ClientConfig {
        self.include_cursor = include;
        self
    }

    pub fn with_clipping(mut self, rect: Rect) -> ClientConfig {
        self.clipping = Some(rect);
        self
    }

    pub fn with_framerate(mut self, framerate: u32) -> ClientConfig {
        self.framerate = framerate;
        self
    }

    pub fn with_reconnect(mut self, retries: u32) -> ClientConfig {
        self.reconnect = retries;
        self
    }
}
