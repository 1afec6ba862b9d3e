use super::rtp::RtpPacket;

/// NAL unit type for FU-A fragments (RFC 6184 §5.8).
pub const NAL_TYPE_FU_A: u8 = 28;
/// NAL unit type for STAP-A aggregation packets (RFC 6184 §5.7.1). Not handled.
pub const NAL_TYPE_STAP_A: u8 = 24;

const ANNEX_B_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// One H.264 NAL unit: the NAL header byte followed by its payload.
///
/// Stored without a start code; [`to_annex_b`](Self::to_annex_b) produces
/// the `00 00 00 01`-prefixed form decoders consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit(Vec<u8>);

impl NalUnit {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Low 5 bits of the NAL header (ITU-T H.264 §7.3.1).
    pub fn nal_type(&self) -> u8 {
        self.0.first().map_or(0, |b| b & 0x1f)
    }

    /// Coded slice of an IDR picture.
    pub fn is_idr(&self) -> bool {
        self.nal_type() == 5
    }

    pub fn to_annex_b(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ANNEX_B_START_CODE.len() + self.0.len());
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(&self.0);
        out
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Concatenate NAL units into one Annex B bitstream.
pub fn annex_b_stream(nal_units: &[NalUnit]) -> Vec<u8> {
    let total: usize = nal_units
        .iter()
        .map(|n| n.len() + ANNEX_B_START_CODE.len())
        .sum();
    let mut out = Vec::with_capacity(total);
    for nal in nal_units {
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(nal.as_bytes());
    }
    out
}

/// All NAL units sharing one RTP timestamp, closed by the marker bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub timestamp: u32,
    pub nal_units: Vec<NalUnit>,
}

impl AccessUnit {
    pub fn contains_idr(&self) -> bool {
        self.nal_units.iter().any(NalUnit::is_idr)
    }
}

/// H.264 RTP depacketizer (RFC 6184), the receive-side inverse of
/// single-NAL and FU-A packetization.
///
/// - **Single NAL Unit** (types 1–23): the payload is the NAL unit.
/// - **FU-A** (type 28): fragments are reassembled into one NAL unit.
///   The original header is rebuilt from the FU indicator's F/NRI bits and
///   the FU header's type bits:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]
///   FU header:     [S|E|R|NAL_Type]
///   rebuilt:       (indicator & 0xE0) | NAL_Type
///   ```
///
/// Everything else, aggregation packets included, is dropped.
///
/// Only one FU-A reassembly is in flight at a time. A Start fragment
/// discards whatever partial NAL was buffered; fragments that arrive with
/// no Start in front of them are dropped.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    fragments: Vec<Vec<u8>>,
    pending: Option<AccessUnit>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the NAL units carried by one RTP payload.
    ///
    /// Returns an empty list while an FU-A is still accumulating, for
    /// unsupported NAL types, and for payloads too short to carry a header.
    pub fn extract_nal_units(&mut self, payload: &[u8]) -> Vec<NalUnit> {
        let Some(&indicator) = payload.first() else {
            return Vec::new();
        };

        match indicator & 0x1f {
            1..=23 => vec![NalUnit::new(payload.to_vec())],
            NAL_TYPE_FU_A => self.push_fragment(indicator, payload),
            nal_type => {
                tracing::trace!(nal_type, "dropping unsupported NAL packet type");
                Vec::new()
            }
        }
    }

    fn push_fragment(&mut self, indicator: u8, payload: &[u8]) -> Vec<NalUnit> {
        if payload.len() < 2 {
            tracing::debug!("FU-A packet without FU header");
            return Vec::new();
        }

        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        let original_type = fu_header & 0x1f;

        if start {
            if !self.fragments.is_empty() {
                tracing::debug!(
                    buffered = self.fragments.len(),
                    "FU-A start before end, discarding partial NAL"
                );
            }
            self.fragments.clear();
            self.fragments.push(vec![(indicator & 0xE0) | original_type]);
        } else if self.fragments.is_empty() {
            tracing::debug!(original_type, end, "FU-A fragment without start, dropped");
            return Vec::new();
        }

        self.fragments.push(payload[2..].to_vec());

        if !end {
            return Vec::new();
        }

        let nal = NalUnit::new(self.fragments.concat());
        self.fragments.clear();
        tracing::trace!(original_type, nal_size = nal.len(), "FU-A NAL reassembled");
        vec![nal]
    }

    /// Feed one RTP packet; returns a complete access unit when the packet
    /// carries the marker bit.
    ///
    /// A timestamp change without a preceding marker means the closing
    /// packet was lost: the partial access unit is discarded.
    pub fn push(&mut self, packet: &RtpPacket) -> Option<AccessUnit> {
        if let Some(pending) = &self.pending
            && pending.timestamp != packet.timestamp
        {
            tracing::debug!(
                dropped_ts = pending.timestamp,
                nal_count = pending.nal_units.len(),
                "access unit lost its marker packet, discarding"
            );
            self.pending = None;
        }

        let nals = self.extract_nal_units(&packet.payload);
        if !nals.is_empty() {
            self.pending
                .get_or_insert_with(|| AccessUnit {
                    timestamp: packet.timestamp,
                    nal_units: Vec::new(),
                })
                .nal_units
                .extend(nals);
        }

        if packet.marker {
            self.pending.take()
        } else {
            None
        }
    }

    /// Drop all buffered state (new session).
    pub fn reset(&mut self) {
        self.fragments.clear();
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fu(indicator: u8, start: bool, end: bool, ty: u8, data: &[u8]) -> Vec<u8> {
        let mut p = vec![(indicator & 0xE0) | NAL_TYPE_FU_A];
        p.push(((start as u8) << 7) | ((end as u8) << 6) | ty);
        p.extend_from_slice(data);
        p
    }

    fn packet(ts: u32, marker: bool, payload: Vec<u8>) -> RtpPacket {
        RtpPacket {
            channel: 0,
            sequence: 0,
            timestamp: ts,
            payload_type: 96,
            marker,
            ssrc: 1,
            payload,
        }
    }

    #[test]
    fn single_nal_passes_through() {
        let mut d = H264Depacketizer::new();
        let nals = d.extract_nal_units(&[0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(nals, vec![NalUnit::new(vec![0x67, 0x42, 0x00, 0x1e])]);
        assert_eq!(nals[0].nal_type(), 7);
    }

    #[test]
    fn fu_a_reassembly() {
        let (a, b, c, d_, e) = (0xA1, 0xB2, 0xC3, 0xD4, 0xE5);
        let mut d = H264Depacketizer::new();
        assert!(d.extract_nal_units(&fu(0x65, true, false, 5, &[a, b])).is_empty());
        assert!(d.extract_nal_units(&fu(0x65, false, false, 5, &[c, d_])).is_empty());
        let out = d.extract_nal_units(&fu(0x65, false, true, 5, &[e]));

        let header = (0x65 & 0xE0) | 5;
        assert_eq!(out, vec![NalUnit::new(vec![header, a, b, c, d_, e])]);
        assert!(out[0].is_idr());
    }

    #[test]
    fn start_and_end_in_one_fragment() {
        let mut d = H264Depacketizer::new();
        let out = d.extract_nal_units(&fu(0x41, true, true, 1, &[9, 8]));
        assert_eq!(out, vec![NalUnit::new(vec![0x41, 9, 8])]);
    }

    #[test]
    fn second_start_discards_partial() {
        let mut d = H264Depacketizer::new();
        d.extract_nal_units(&fu(0x65, true, false, 5, &[1, 2]));
        d.extract_nal_units(&fu(0x41, true, false, 1, &[3]));
        let out = d.extract_nal_units(&fu(0x41, false, true, 1, &[4]));
        assert_eq!(out, vec![NalUnit::new(vec![0x41, 3, 4])]);
    }

    #[test]
    fn orphan_fragments_are_dropped() {
        let mut d = H264Depacketizer::new();
        assert!(d.extract_nal_units(&fu(0x65, false, false, 5, &[1])).is_empty());
        assert!(d.extract_nal_units(&fu(0x65, false, true, 5, &[2])).is_empty());
    }

    #[test]
    fn unsupported_types_are_ignored() {
        let mut d = H264Depacketizer::new();
        assert!(d.extract_nal_units(&[NAL_TYPE_STAP_A, 0, 2, 0x67, 0x42]).is_empty());
        assert!(d.extract_nal_units(&[29, 0x80]).is_empty());
        assert!(d.extract_nal_units(&[0]).is_empty());
        assert!(d.extract_nal_units(&[]).is_empty());
        assert!(d.extract_nal_units(&[NAL_TYPE_FU_A]).is_empty());
    }

    #[test]
    fn stap_a_does_not_disturb_reassembly() {
        let mut d = H264Depacketizer::new();
        d.extract_nal_units(&fu(0x65, true, false, 5, &[1]));
        d.extract_nal_units(&[NAL_TYPE_STAP_A, 0, 1, 0x09]);
        let out = d.extract_nal_units(&fu(0x65, false, true, 5, &[2]));
        assert_eq!(out, vec![NalUnit::new(vec![0x65, 1, 2])]);
    }

    #[test]
    fn access_unit_closes_on_marker() {
        let mut d = H264Depacketizer::new();
        assert!(d.push(&packet(3000, false, vec![0x67, 1])).is_none());
        assert!(d.push(&packet(3000, false, vec![0x68, 2])).is_none());
        let au = d.push(&packet(3000, true, vec![0x65, 3])).unwrap();
        assert_eq!(au.timestamp, 3000);
        assert_eq!(au.nal_units.len(), 3);
        assert!(au.contains_idr());
    }

    #[test]
    fn timestamp_change_discards_unterminated_unit() {
        let mut d = H264Depacketizer::new();
        d.push(&packet(3000, false, vec![0x41, 1]));
        let au = d.push(&packet(6000, true, vec![0x41, 2])).unwrap();
        assert_eq!(au.timestamp, 6000);
        assert_eq!(au.nal_units, vec![NalUnit::new(vec![0x41, 2])]);
    }

    #[test]
    fn marker_on_empty_unit_yields_nothing() {
        let mut d = H264Depacketizer::new();
        assert!(d.push(&packet(3000, true, vec![NAL_TYPE_STAP_A, 0])).is_none());
    }

    #[test]
    fn annex_b_framing() {
        let nals = vec![NalUnit::new(vec![0x67, 1]), NalUnit::new(vec![0x68, 2])];
        assert_eq!(
            annex_b_stream(&nals),
            vec![0, 0, 0, 1, 0x67, 1, 0, 0, 0, 1, 0x68, 2]
        );
        assert_eq!(nals[0].to_annex_b(), vec![0, 0, 0, 1, 0x67, 1]);
    }
}
