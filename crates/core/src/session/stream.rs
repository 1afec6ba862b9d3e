use std::io::{BufRead, Write};
use std::time::Instant;

use super::client::MediaSink;
use super::{RtspSession, StreamSetup};
use crate::error::Result;
use crate::media::{H264Depacketizer, RtpPacket, SequenceCheck, SequenceTracker};
use crate::transport::{Demultiplexer, Frame};

/// Per-stream receive state: FU-A reassembly and sequence tracking.
///
/// Owned by one session loop; recreated for every connection.
pub(crate) struct StreamReader {
    depacketizer: H264Depacketizer,
    sequence: SequenceTracker,
    pub(crate) packets: u64,
    pub(crate) dropped: u64,
}

impl StreamReader {
    pub(crate) fn new() -> Self {
        Self {
            depacketizer: H264Depacketizer::new(),
            sequence: SequenceTracker::new(),
            packets: 0,
            dropped: 0,
        }
    }

    /// Read until the connection fails.
    ///
    /// Only returns with an error: end-of-stream is
    /// [`Error::ConnectionDropped`](crate::Error::ConnectionDropped).
    pub(crate) fn run<R: BufRead, W: Write>(
        &mut self,
        session: &mut RtspSession,
        demux: &mut Demultiplexer<R>,
        writer: &mut W,
        setup: &StreamSetup,
        sink: &mut dyn MediaSink,
    ) -> Result<()> {
        let mut last_keepalive = Instant::now();

        loop {
            match demux.read_frame()? {
                Frame::Data { channel, payload } if channel == setup.channels.rtp_channel => {
                    self.on_rtp(channel, &payload, sink);
                }
                Frame::Data { channel, payload } => {
                    tracing::trace!(channel, len = payload.len(), "ignoring non-RTP channel");
                }
                Frame::Message(m) => {
                    tracing::debug!(
                        start_line = %m.start_line,
                        "discarding RTSP message while streaming"
                    );
                }
            }

            if last_keepalive.elapsed() >= setup.keepalive_interval {
                session.send_keepalive(writer, setup)?;
                last_keepalive = Instant::now();
            }
        }
    }

    pub(crate) fn on_rtp(&mut self, channel: u8, data: &[u8], sink: &mut dyn MediaSink) {
        let packet = match RtpPacket::parse(channel, data) {
            Ok(p) => p,
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(error = %e, len = data.len(), "dropping RTP packet");
                return;
            }
        };
        self.packets += 1;

        match self.sequence.observe(packet.sequence) {
            SequenceCheck::InOrder => {}
            SequenceCheck::Gap { lost } => {
                tracing::debug!(seq = packet.sequence, lost, "RTP sequence gap");
            }
            SequenceCheck::Late => {
                tracing::debug!(seq = packet.sequence, "late or duplicate RTP packet");
            }
        }

        if let Some(access_unit) = self.depacketizer.push(&packet) {
            tracing::trace!(
                ts = access_unit.timestamp,
                nal_count = access_unit.nal_units.len(),
                idr = access_unit.contains_idr(),
                "access unit"
            );
            sink.on_access_unit(access_unit);
        }
    }
}
