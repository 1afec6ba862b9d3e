//! Network transport for the RTSP client.
//!
//! RTSP over TCP with interleaved media (RFC 2326 §10.12) uses a single
//! connection for everything:
//!
//! - **TCP** ([`tcp`]): opens the connection to the camera and hands back
//!   separate read and write halves.
//!
//! - **Interleaved framing** ([`interleaved`]): once PLAY succeeds, RTP and
//!   RTCP arrive on the same socket as `$`-prefixed binary frames mixed
//!   with ordinary RTSP text messages. The demultiplexer tells them apart.

pub mod interleaved;
pub mod tcp;

pub use interleaved::{Demultiplexer, Frame, INTERLEAVE_MARKER};
