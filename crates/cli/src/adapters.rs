//! Concrete boundary adapters for running without a video decoder or
//! message broker.

use std::io::Write;

use levelcam::media::h264::annex_b_stream;
use levelcam::media::{DecodeError, FrameDecoder, NalUnit, RasterFrame};
use levelcam::publish::{PublishError, Publisher, Qos};

/// "Decodes" each access unit into its Annex-B byte stream.
///
/// Parameter sets from the SDP are prepended to every IDR access unit so
/// each emitted frame is independently decodable (e.g. by `ffmpeg -f h264`).
#[derive(Debug, Default)]
pub struct AnnexBPassthrough {
    parameter_sets: Vec<NalUnit>,
}

impl FrameDecoder for AnnexBPassthrough {
    fn parameter_sets(&mut self, nal_units: &[NalUnit]) {
        self.parameter_sets = nal_units.to_vec();
    }

    fn decode(&mut self, nal_units: &[NalUnit]) -> Result<Option<RasterFrame>, DecodeError> {
        if nal_units.is_empty() {
            return Ok(None);
        }
        let data = if nal_units.iter().any(NalUnit::is_idr) && !self.parameter_sets.is_empty() {
            let mut all = self.parameter_sets.clone();
            all.extend_from_slice(nal_units);
            annex_b_stream(&all)
        } else {
            annex_b_stream(nal_units)
        };
        Ok(Some(RasterFrame {
            width: 0,
            height: 0,
            data,
        }))
    }
}

/// Writes each message to stdout as `<topic> <payload>`.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), PublishError> {
        tracing::debug!(topic, qos = qos.level(), retain, bytes = payload.len(), "publish");
        let mut out = std::io::stdout().lock();
        writeln!(out, "{topic} {}", String::from_utf8_lossy(payload))
            .map_err(|e| PublishError(e.to_string()))
    }
}
