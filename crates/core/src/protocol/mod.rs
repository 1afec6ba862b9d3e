//! RTSP client-side protocol (RFC 2326).
//!
//! This module handles the text-based RTSP signaling a camera client
//! needs: building requests, parsing responses, and reading the SDP
//! returned by DESCRIBE.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://camera/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Authorization: Basic dXNlcjpwYXNz\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: the server assigns a session ID at SETUP (RFC 2326 §12.37).
//! - Every request carries a CSeq that the response echoes (§12.17).
//! - After PLAY, media may share the TCP connection as `$`-framed binary
//!   data (§10.12), see [`crate::transport::interleaved`].
//!
//! ## Methods sent
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability probe |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate interleaved transport |
//! | PLAY | §10.5 | Start media delivery |
//! | GET_PARAMETER | §10.8 | Keepalive |
//! | TEARDOWN | §10.7 | Release the session |

pub mod message;
pub mod request;
pub mod response;
pub mod sdp;

pub use message::RtspMessage;
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
pub use sdp::SessionDescription;
