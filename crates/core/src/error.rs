//! Error types for the levelcam core.

use std::fmt;

/// Errors that can occur while ingesting a camera stream.
///
/// Variants map to the failure classes the session loop cares about:
///
/// - **Connection**: [`Io`](Self::Io), [`ConnectionDropped`](Self::ConnectionDropped).
///   Socket failures or end-of-stream. The session is torn down and retried.
/// - **Protocol**: [`Protocol`](Self::Protocol). The camera answered with
///   something we cannot continue from. Handled exactly like a connection error.
/// - **Setup**: [`InvalidUrl`](Self::InvalidUrl), [`Config`](Self::Config).
///   Rejected before any network activity.
/// - **Lifecycle**: [`AlreadyRunning`](Self::AlreadyRunning),
///   [`NotStarted`](Self::NotStarted).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection (EOF) or a frame was cut short.
    #[error("connection dropped: {0}")]
    ConnectionDropped(&'static str),

    /// The camera violated the RTSP exchange we expect (RFC 2326).
    #[error("RTSP protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// The configured stream URL could not be turned into an
    /// [`RtspTarget`](crate::session::RtspTarget).
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A component was started twice.
    #[error("already running")]
    AlreadyRunning,

    /// A component was used before being started.
    #[error("not started")]
    NotStarted,
}

impl Error {
    pub(crate) fn protocol(kind: ProtocolErrorKind) -> Self {
        Self::Protocol { kind }
    }

    /// Socket-level failure: open/read/write error or EOF.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionDropped(_))
    }

    /// The peer spoke, but not in a way the session can continue from.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

/// Specific kind of RTSP protocol failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Status line did not have the `RTSP/1.0 <code> <reason>` shape.
    BadStatusLine,
    /// Status line carried a version other than `RTSP/1.0`.
    UnsupportedVersion(String),
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The server answered with a non-2xx status.
    Status(u16, String),
    /// DESCRIBE succeeded but carried no SDP body.
    MissingBody,
    /// A header required to continue was absent.
    MissingHeader(&'static str),
    /// The response CSeq does not echo the request's.
    CSeqMismatch { expected: u32, got: String },
    /// `Content-Length` was not a number.
    InvalidContentLength,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatusLine => write!(f, "bad status line"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported version {v}"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::Status(code, reason) => write!(f, "status {code} {reason}"),
            Self::MissingBody => write!(f, "missing body"),
            Self::MissingHeader(name) => write!(f, "missing {name} header"),
            Self::CSeqMismatch { expected, got } => {
                write!(f, "CSeq mismatch: expected {expected}, got {got}")
            }
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
        }
    }
}

/// Why a single RTP packet was dropped.
///
/// Never escalates to a session failure: the read loop logs and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RtpError {
    /// Header, CSRC list, extension or padding does not fit the buffer.
    #[error("incomplete RTP packet")]
    Incomplete,
    /// Version field is not 2.
    #[error("malformed RTP packet (version {0})")]
    Malformed(u8),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
