//! RTP receive path and H.264 depacketization.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each packet read off the interleaved connection carries a 12-byte fixed
//! header ([`rtp::RtpPacket`]) followed by a codec payload. The fields we
//! rely on:
//!
//! - **Sequence number** (16-bit, wrapping): loss and reorder detection only.
//! - **Timestamp** (32-bit): groups packets into access units (90 kHz for video).
//! - **Marker bit**: set on the last packet of an access unit.
//!
//! ## H.264 (RFC 6184)
//!
//! [`h264::H264Depacketizer`] turns payloads back into NAL units, handling
//! single-NAL packets and FU-A fragments. Aggregation packets (STAP-A) are
//! dropped.
//!
//! Turning NAL units into pixels is the job of a [`FrameDecoder`], which
//! lives outside this crate.

pub mod h264;
pub mod rtp;

pub use h264::{AccessUnit, H264Depacketizer, NalUnit};
pub use rtp::{RtpPacket, SequenceCheck, SequenceTracker};

/// A decoded picture handed to a level detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    /// Encoded or raw pixel data; the layout is agreed between the decoder
    /// and the detector.
    pub data: Vec<u8>,
}

/// Failure reported by a [`FrameDecoder`].
#[derive(Debug, thiserror::Error)]
#[error("decode failed: {0}")]
pub struct DecodeError(pub String);

/// Turns H.264 NAL units into pictures.
///
/// Implemented outside the core (ffmpeg, a hardware decoder, a snapshot
/// endpoint). `Ok(None)` means not enough data has arrived yet for a
/// complete picture; the caller keeps feeding access units.
pub trait FrameDecoder: Send {
    /// Parameter sets announced out-of-band in SDP (`sprop-parameter-sets`).
    ///
    /// Called once per session before the first access unit. The default
    /// ignores them.
    fn parameter_sets(&mut self, _nal_units: &[NalUnit]) {}

    fn decode(&mut self, nal_units: &[NalUnit]) -> Result<Option<RasterFrame>, DecodeError>;
}
