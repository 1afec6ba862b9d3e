/// Interleaved channel pair negotiated during SETUP (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
///
/// Server → Client:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=1A2B3C4D
/// ```
///
/// RTP arrives on `rtp_channel`, RTCP on `rtcp_channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavedChannels {
    pub rtp_channel: u8,
    pub rtcp_channel: u8,
}

impl Default for InterleavedChannels {
    fn default() -> Self {
        Self {
            rtp_channel: 0,
            rtcp_channel: 1,
        }
    }
}

impl InterleavedChannels {
    /// The `Transport` value the client requests.
    pub fn request_header(&self) -> String {
        format!(
            "RTP/AVP/TCP;unicast;interleaved={}-{}",
            self.rtp_channel, self.rtcp_channel
        )
    }

    /// Parse the `interleaved=RTP-RTCP` parameter of a `Transport` header.
    ///
    /// ## Examples
    ///
    /// ```
    /// use levelcam::session::transport::InterleavedChannels;
    ///
    /// let ch = InterleavedChannels::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert_eq!(ch.rtp_channel, 2);
    /// assert_eq!(ch.rtcp_channel, 3);
    ///
    /// assert!(InterleavedChannels::parse("RTP/AVP;unicast;client_port=8000-8001").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(channels) = part.strip_prefix("interleaved=") {
                let (rtp, rtcp) = match channels.split_once('-') {
                    Some((rtp, rtcp)) => (rtp.trim().parse().ok()?, rtcp.trim().parse().ok()?),
                    None => {
                        let rtp: u8 = channels.trim().parse().ok()?;
                        (rtp, rtp.wrapping_add(1))
                    }
                };
                return Some(Self {
                    rtp_channel: rtp,
                    rtcp_channel: rtcp,
                });
            }
        }
        None
    }
}
