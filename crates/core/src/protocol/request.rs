use base64::prelude::{BASE64_STANDARD, Engine as _};

/// Client identification sent with every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = concat!("levelcam/", env!("CARGO_PKG_VERSION"));

/// RTSP methods issued by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    GetParameter,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::GetParameter => "GET_PARAMETER",
            Self::Teardown => "TEARDOWN",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the standard text format:
///
/// ```text
/// SETUP rtsp://camera/stream/trackID=1 RTSP/1.0\r\n
/// CSeq: 3\r\n
/// Authorization: Basic dXNlcjpwYXNz\r\n
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n
/// \r\n
/// ```
///
/// `CSeq` is always the first header. Uses a builder pattern; chain
/// [`authorization`](Self::authorization) and [`add_header`](Self::add_header),
/// then call [`serialize`](Self::serialize).
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    pub uri: String,
    pub cseq: u32,
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str, cseq: u32) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            cseq,
            headers: vec![("CSeq".to_string(), cseq.to_string())],
        }
    }

    /// Attach `Authorization: Basic <base64(user:pass)>` (RFC 2617 §2)
    /// when credentials are configured.
    pub fn authorization(self, credentials: Option<(&str, &str)>) -> Self {
        match credentials {
            Some((user, pass)) => {
                let token = BASE64_STANDARD.encode(format!("{user}:{pass}"));
                self.add_header("Authorization", &format!("Basic {token}"))
            }
            None => self,
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }
}
