use super::message::RtspMessage;
use crate::error::{Error, ProtocolErrorKind, Result};

/// An RTSP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 3\r\n
/// Session: 12345678;timeout=60\r\n
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n
/// \r\n
/// ```
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RtspResponse {
    /// Interpret a message as a response.
    ///
    /// The status line must read `RTSP/1.0 <code> <reason>`; any other
    /// protocol version is rejected.
    pub fn from_message(message: RtspMessage) -> Result<Self> {
        let mut parts = message.start_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().unwrap_or_default();
        let reason = parts.next().unwrap_or_default().trim().to_string();

        if !version.starts_with("RTSP/") {
            return Err(Error::protocol(ProtocolErrorKind::BadStatusLine));
        }
        if version != "RTSP/1.0" {
            return Err(Error::protocol(ProtocolErrorKind::UnsupportedVersion(
                version.to_string(),
            )));
        }

        let status_code = code
            .parse::<u16>()
            .map_err(|_| Error::protocol(ProtocolErrorKind::BadStatusLine))?;

        Ok(Self {
            status_code,
            reason,
            headers: message.headers,
            body: message.body,
        })
    }

    /// 2xx (RFC 2326 §7.1.1).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Fail with [`ProtocolErrorKind::Status`] unless 2xx.
    pub fn require_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::protocol(ProtocolErrorKind::Status(
                self.status_code,
                self.reason,
            )))
        }
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Session ID from the `Session` header, without the `;timeout=` suffix
    /// (RFC 2326 §12.37).
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|s| !s.is_empty())
    }

    /// `timeout=` parameter of the `Session` header, in seconds.
    pub fn session_timeout(&self) -> Option<u64> {
        self.get_header("Session")?
            .split(';')
            .skip(1)
            .filter_map(|p| p.trim().strip_prefix("timeout="))
            .find_map(|v| v.trim().parse().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
