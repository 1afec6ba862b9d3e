//! SDP (Session Description Protocol) reading (RFC 4566 / RFC 8866).
//!
//! DESCRIBE returns an SDP body like:
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 192.168.1.10
//! s=Camera
//! t=0 0
//! a=control:*                                  ← aggregate control, ignored
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAH5WoFAFuQA==,aM48gA==
//! a=control:trackID=1                          ← track control URL for SETUP
//! ```
//!
//! Only what SETUP and the decoder need is extracted: the control URL of
//! the video track, its payload type and codec, and the SPS/PPS carried in
//! `sprop-parameter-sets` (RFC 6184 §8.1).

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::media::NalUnit;

/// Track path used when the SDP names no control URL.
pub const DEFAULT_TRACK: &str = "trackID=1";

/// The parts of a DESCRIBE body the client acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    /// Raw `a=control:` value for the video track, if any.
    pub control: Option<String>,
    /// Payload type from the `m=video` line.
    pub payload_type: Option<u8>,
    /// Encoding name from `a=rtpmap` (e.g. `H264`).
    pub codec: Option<String>,
    /// SPS/PPS decoded from `sprop-parameter-sets`.
    pub parameter_sets: Vec<NalUnit>,
}

impl SessionDescription {
    /// Scan an SDP body.
    ///
    /// The control URL is the first `a=control:` inside the first video
    /// media section; when that section has none, the first `a=control:`
    /// anywhere. The aggregate value `*` never counts.
    ///
    /// This is not simply the first `a=control:` line in the body. Cameras
    /// commonly put a session-level `a=control:*` or an audio track ahead of
    /// the video, and SETUP against either never yields H.264:
    ///
    /// ```
    /// use levelcam::protocol::sdp::SessionDescription;
    ///
    /// let sdp = "v=0\r\na=control:*\r\n\
    ///            m=audio 0 RTP/AVP 0\r\na=control:track2\r\n\
    ///            m=video 0 RTP/AVP 96\r\na=control:track1\r\n";
    /// assert_eq!(SessionDescription::parse(sdp).control.as_deref(), Some("track1"));
    /// ```
    pub fn parse(body: &str) -> Self {
        let mut desc = Self::default();
        let mut first_control: Option<String> = None;
        let mut in_video = false;
        let mut seen_video = false;

        for line in body.lines().map(str::trim) {
            if let Some(media) = line.strip_prefix("m=") {
                let is_video = media.starts_with("video") && !seen_video;
                if is_video {
                    seen_video = true;
                    desc.payload_type = media
                        .split_whitespace()
                        .nth(3)
                        .and_then(|pt| pt.parse().ok());
                }
                in_video = is_video;
                continue;
            }

            if let Some(control) = line.strip_prefix("a=control:") {
                let control = control.trim();
                if control.is_empty() || control == "*" {
                    continue;
                }
                if in_video && desc.control.is_none() {
                    desc.control = Some(control.to_string());
                }
                if first_control.is_none() {
                    first_control = Some(control.to_string());
                }
                continue;
            }

            if !in_video {
                continue;
            }

            if let Some(rtpmap) = line.strip_prefix("a=rtpmap:") {
                if desc.codec.is_none() {
                    desc.codec = rtpmap
                        .split_whitespace()
                        .nth(1)
                        .and_then(|enc| enc.split('/').next())
                        .map(str::to_string);
                }
            } else if let Some(fmtp) = line.strip_prefix("a=fmtp:")
                && desc.parameter_sets.is_empty()
            {
                desc.parameter_sets = parse_sprop_parameter_sets(fmtp);
            }
        }

        if desc.control.is_none() {
            desc.control = first_control;
        }
        desc
    }

    /// Resolve the control URL against the request URL (RFC 2326 §C.1.1).
    pub fn control_url(&self, base_url: &str) -> String {
        resolve_control(base_url, self.control.as_deref())
    }
}

/// Resolve an `a=control:` value against `base_url`.
///
/// - absolute (`rtsp://...`): used verbatim
/// - starts with `/`: replaces the path of `base_url`
/// - anything else: appended to `base_url`
/// - absent: `<base_url>/trackID=1`
pub fn resolve_control(base_url: &str, control: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    match control {
        Some(c) if c.starts_with("rtsp://") || c.starts_with("rtsps://") => c.to_string(),
        Some(c) if c.starts_with('/') => format!("{}{}", origin(base), c),
        Some(c) => format!("{}/{}", base, c),
        None => format!("{}/{}", base, DEFAULT_TRACK),
    }
}

/// `rtsp://host:port/path` → `rtsp://host:port`
fn origin(url: &str) -> &str {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    match url[after_scheme..].find('/') {
        Some(slash) => &url[..after_scheme + slash],
        None => url,
    }
}

/// Decode `sprop-parameter-sets=<b64>,<b64>` from an fmtp attribute value.
/// Undecodable entries are skipped.
fn parse_sprop_parameter_sets(fmtp: &str) -> Vec<NalUnit> {
    let params = fmtp.split_once(' ').map_or("", |(_, p)| p);
    params
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("sprop-parameter-sets="))
        .flat_map(|v| v.split(','))
        .filter_map(|b64| match BASE64_STANDARD.decode(b64.trim()) {
            Ok(bytes) if !bytes.is_empty() => Some(NalUnit::new(bytes)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable sprop-parameter-sets entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "rtsp://192.168.1.10:554/stream1";

    #[test]
    fn relative_control_is_appended() {
        let sdp =
            SessionDescription::parse("v=0\r\nm=video 0 RTP/AVP 96\r\na=control:trackID=1\r\n");
        assert_eq!(sdp.control_url(BASE), format!("{BASE}/trackID=1"));
    }

    #[test]
    fn absolute_control_is_verbatim() {
        let sdp =
            SessionDescription::parse("m=video 0 RTP/AVP 96\r\na=control:rtsp://host/track2\r\n");
        assert_eq!(sdp.control_url(BASE), "rtsp://host/track2");
    }

    #[test]
    fn rooted_control_uses_target_host() {
        let sdp = SessionDescription::parse("m=video 0 RTP/AVP 96\r\na=control:/live/ch0\r\n");
        assert_eq!(sdp.control_url(BASE), "rtsp://192.168.1.10:554/live/ch0");
    }

    #[test]
    fn missing_control_falls_back_to_track1() {
        let sdp = SessionDescription::parse("v=0\r\nm=video 0 RTP/AVP 96\r\n");
        assert_eq!(sdp.control, None);
        assert_eq!(sdp.control_url(BASE), format!("{BASE}/trackID=1"));
        assert_eq!(sdp.control_url(&format!("{BASE}/")), format!("{BASE}/trackID=1"));
    }

    #[test]
    fn aggregate_star_is_skipped_and_video_section_wins() {
        let body = "v=0\r\n\
                    a=control:*\r\n\
                    m=audio 0 RTP/AVP 0\r\n\
                    a=control:trackID=2\r\n\
                    m=video 0 RTP/AVP 96\r\n\
                    a=rtpmap:96 H264/90000\r\n\
                    a=control:trackID=1\r\n";
        let sdp = SessionDescription::parse(body);
        assert_eq!(sdp.control.as_deref(), Some("trackID=1"));
        assert_eq!(sdp.payload_type, Some(96));
        assert_eq!(sdp.codec.as_deref(), Some("H264"));
    }

    #[test]
    fn session_level_control_used_when_media_has_none() {
        let body = "v=0\r\na=control:rtsp://cam/agg\r\nm=video 0 RTP/AVP 96\r\n";
        let sdp = SessionDescription::parse(body);
        assert_eq!(sdp.control_url(BASE), "rtsp://cam/agg");
    }

    #[test]
    fn sprop_parameter_sets_decoded() {
        let body = "m=video 0 RTP/AVP 96\r\n\
                    a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAHg==,aM48gA==\r\n";
        let sdp = SessionDescription::parse(body);
        assert_eq!(sdp.parameter_sets.len(), 2);
        assert_eq!(sdp.parameter_sets[0].as_bytes(), &[0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(sdp.parameter_sets[0].nal_type(), 7);
        assert_eq!(sdp.parameter_sets[1].as_bytes(), &[0x68, 0xce, 0x3c, 0x80]);
    }

    #[test]
    fn bad_sprop_entry_skipped() {
        let body = "m=video 0 RTP/AVP 96\r\na=fmtp:96 sprop-parameter-sets=!!!,aM48gA==\r\n";
        let sdp = SessionDescription::parse(body);
        assert_eq!(sdp.parameter_sets.len(), 1);
    }
}
