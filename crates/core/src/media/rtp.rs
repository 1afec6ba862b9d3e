use crate::error::RtpError;

const FIXED_HEADER_LEN: usize = 12;
const RTP_VERSION: u8 = 2;

/// A received RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            CSRC list (CC × 4 bytes, skipped)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  [extension: id(16) length-in-words(16) data, skipped]        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `channel` is the interleave channel the packet arrived on
/// (RFC 2326 §10.12), not part of the RTP header itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub channel: u8,
    /// 16-bit, wrapping.
    pub sequence: u16,
    pub timestamp: u32,
    /// 7-bit payload type (RFC 3551).
    pub payload_type: u8,
    /// Last packet of an access unit for H.264 (RFC 6184 §5.1).
    pub marker: bool,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Parse one RTP packet received on `channel`.
    ///
    /// Every skip is bounds-checked against the remaining buffer; a buffer
    /// that is too short for the declared CSRC list, extension or padding
    /// yields [`RtpError::Incomplete`]. A version other than 2 yields
    /// [`RtpError::Malformed`].
    pub fn parse(channel: u8, data: &[u8]) -> Result<Self, RtpError> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(RtpError::Incomplete);
        }

        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(RtpError::Malformed(version));
        }

        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0f) as usize;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7f;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = FIXED_HEADER_LEN + csrc_count * 4;
        if offset > data.len() {
            return Err(RtpError::Incomplete);
        }

        if extension {
            if offset + 4 > data.len() {
                return Err(RtpError::Incomplete);
            }
            let profile = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4;
            if offset + words * 4 > data.len() {
                return Err(RtpError::Incomplete);
            }
            offset += words * 4;
            tracing::trace!(profile, words, "skipped RTP header extension");
        }

        let mut end = data.len();
        if padding {
            if end == offset {
                return Err(RtpError::Incomplete);
            }
            let pad = data[end - 1] as usize;
            if pad >= end - offset {
                return Err(RtpError::Incomplete);
            }
            end -= pad;
        }

        Ok(Self {
            channel,
            sequence,
            timestamp,
            payload_type,
            marker,
            ssrc,
            payload: data[offset..end].to_vec(),
        })
    }
}

/// Outcome of feeding one sequence number to a [`SequenceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First packet, or exactly the expected successor.
    InOrder,
    /// `lost` packets were skipped before this one.
    Gap { lost: u16 },
    /// The packet is older than one already seen (late or duplicate).
    Late,
}

/// Detects loss and reordering on one RTP stream.
///
/// Detection only: nothing is buffered or reordered. Comparison uses
/// wrapping arithmetic so the 65535 → 0 rollover is in order.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    expected: Option<u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sequence: u16) -> SequenceCheck {
        let Some(expected) = self.expected else {
            self.expected = Some(sequence.wrapping_add(1));
            return SequenceCheck::InOrder;
        };

        let delta = sequence.wrapping_sub(expected);
        if delta == 0 {
            self.expected = Some(sequence.wrapping_add(1));
            SequenceCheck::InOrder
        } else if delta < 0x8000 {
            self.expected = Some(sequence.wrapping_add(1));
            SequenceCheck::Gap { lost: delta }
        } else {
            SequenceCheck::Late
        }
    }

    /// Forget the stream position (new session, new SSRC).
    pub fn reset(&mut self) {
        self.expected = None;
    }
}
