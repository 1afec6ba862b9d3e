use crate::error::{Error, ProtocolErrorKind, Result};

/// A text RTSP message read off the wire, before interpretation.
///
/// ```text
/// Start-Line CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body of Content-Length bytes]
/// ```
///
/// While streaming, the camera may interleave responses to our keepalives
/// and its own requests (e.g. `SET_PARAMETER`) with media frames, so the
/// start line is kept verbatim and only interpreted on demand.
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspMessage {
    pub start_line: String,
    /// Headers as ordered (name, value) pairs, names stored as received.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RtspMessage {
    /// Parse the start line and headers of a message.
    ///
    /// `raw` is everything up to and including the blank line; the body is
    /// read separately once [`content_length`](Self::content_length) is known.
    pub fn parse_head(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let start_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(Error::protocol(ProtocolErrorKind::BadStatusLine))?
            .to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line
                .find(':')
                .ok_or(Error::protocol(ProtocolErrorKind::InvalidHeader))?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(Self {
            start_line,
            headers,
            body: Vec::new(),
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body size announced by `Content-Length` (RFC 2326 §12.14), 0 if absent.
    pub fn content_length(&self) -> Result<usize> {
        match self.get_header("Content-Length") {
            Some(v) => v
                .parse()
                .map_err(|_| Error::protocol(ProtocolErrorKind::InvalidContentLength)),
            None => Ok(0),
        }
    }

    /// Responses start with the protocol version; requests with a method.
    pub fn is_response(&self) -> bool {
        self.start_line.starts_with("RTSP/")
    }
}
