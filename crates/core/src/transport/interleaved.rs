use std::io::{self, BufRead, Read};

use crate::error::{Error, ProtocolErrorKind, Result};
use crate::protocol::RtspMessage;

/// First byte of an interleaved binary frame (`$`, RFC 2326 §10.12).
pub const INTERLEAVE_MARKER: u8 = 0x24;

const MAX_LINE_LEN: u64 = 8 * 1024;
const MAX_HEADERS: usize = 64;
/// Largest accepted message body. DESCRIBE answers are a few KiB at most.
const MAX_BODY_LEN: usize = 64 * 1024;

/// One unit read off a shared RTSP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `$` + channel + 16-bit big-endian length + payload.
    Data { channel: u8, payload: Vec<u8> },
    /// A complete RTSP text message (status or request line, headers, body).
    Message(RtspMessage),
}

/// Splits one duplex byte stream into text messages and binary frames.
///
/// ```text
/// +------+---------+----------------+---------------------+
/// | 0x24 | channel | length (u16 BE)| payload (length)    |
/// +------+---------+----------------+---------------------+
/// ```
///
/// Any other leading byte starts a CRLF-terminated text message. End of
/// stream in either mode, including a binary frame cut short, surfaces as
/// [`Error::ConnectionDropped`]; a partial frame is never returned.
pub struct Demultiplexer<R> {
    reader: R,
}

impl<R: BufRead> Demultiplexer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Block until the next complete frame or message.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            let first = self.read_byte()?;

            if first == INTERLEAVE_MARKER {
                return self.read_data();
            }

            if first == b'\r' || first == b'\n' {
                // Stray line terminator between messages.
                continue;
            }

            return self.read_message(first).map(Frame::Message);
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte, "connection closed")?;
        Ok(byte[0])
    }

    fn read_exact(&mut self, buf: &mut [u8], reason: &'static str) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::ConnectionDropped(reason),
            _ => Error::Io(e),
        })
    }

    fn read_data(&mut self) -> Result<Frame> {
        let mut header = [0u8; 3];
        self.read_exact(&mut header, "interleaved frame header truncated")?;
        let channel = header[0];
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;

        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload, "interleaved frame payload truncated")?;

        tracing::trace!(channel, len, "interleaved frame");
        Ok(Frame::Data { channel, payload })
    }

    fn read_message(&mut self, first: u8) -> Result<RtspMessage> {
        let mut head = vec![first];
        self.read_line_into(&mut head)?;

        let mut header_count = 0;
        loop {
            let line_start = head.len();
            self.read_line_into(&mut head)?;
            let line = &head[line_start..];
            if line == b"\r\n" || line == b"\n" {
                break;
            }
            header_count += 1;
            if header_count > MAX_HEADERS {
                return Err(Error::protocol(ProtocolErrorKind::InvalidHeader));
            }
        }

        let mut message = RtspMessage::parse_head(&String::from_utf8_lossy(&head))?;
        let len = message.content_length()?;
        if len > MAX_BODY_LEN {
            return Err(Error::protocol(ProtocolErrorKind::InvalidContentLength));
        }
        if len > 0 {
            let mut body = vec![0u8; len];
            self.read_exact(&mut body, "message body truncated")?;
            message.body = body;
        }

        tracing::trace!(start_line = %message.start_line, body_len = len, "RTSP message");
        Ok(message)
    }

    fn read_line_into(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let start = buf.len();
        let n = (&mut self.reader).take(MAX_LINE_LEN).read_until(b'\n', buf)?;
        if n == 0 {
            return Err(Error::ConnectionDropped("connection closed mid-message"));
        }
        if buf.last() != Some(&b'\n') {
            if (buf.len() - start) as u64 >= MAX_LINE_LEN {
                return Err(Error::protocol(ProtocolErrorKind::InvalidHeader));
            }
            return Err(Error::ConnectionDropped("connection closed mid-line"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn demux(bytes: &[u8]) -> Demultiplexer<Cursor<Vec<u8>>> {
        Demultiplexer::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn reads_binary_frame() {
        let mut d = demux(&[0x24, 0x00, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);
        assert_eq!(
            d.read_frame().unwrap(),
            Frame::Data {
                channel: 0,
                payload: vec![0xAA, 0xBB, 0xCC]
            }
        );
    }

    #[test]
    fn reads_message_with_body_then_frame() {
        let mut bytes = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nv=0\r\n".to_vec();
        bytes.extend_from_slice(&[0x24, 0x01, 0x00, 0x01, 0x7F]);
        let mut d = demux(&bytes);

        match d.read_frame().unwrap() {
            Frame::Message(m) => {
                assert_eq!(m.start_line, "RTSP/1.0 200 OK");
                assert_eq!(m.get_header("CSeq"), Some("2"));
                assert_eq!(m.body, b"v=0\r\n");
            }
            other => panic!("expected message, got {other:?}"),
        }
        assert_eq!(
            d.read_frame().unwrap(),
            Frame::Data {
                channel: 1,
                payload: vec![0x7F]
            }
        );
    }

    #[test]
    fn skips_stray_crlf() {
        let mut d = demux(b"\r\nRTSP/1.0 200 OK\r\nCSeq: 5\r\n\r\n");
        assert!(matches!(d.read_frame().unwrap(), Frame::Message(_)));
    }

    #[test]
    fn zero_length_frame() {
        let mut d = demux(&[0x24, 0x02, 0x00, 0x00]);
        assert_eq!(
            d.read_frame().unwrap(),
            Frame::Data {
                channel: 2,
                payload: vec![]
            }
        );
    }

    #[test]
    fn eof_is_connection_dropped() {
        let mut d = demux(&[]);
        assert!(matches!(d.read_frame(), Err(Error::ConnectionDropped(_))));
    }

    #[test]
    fn short_payload_is_connection_dropped() {
        let mut d = demux(&[0x24, 0x00, 0x00, 0x10, 0x01, 0x02]);
        assert!(matches!(d.read_frame(), Err(Error::ConnectionDropped(_))));
    }

    #[test]
    fn truncated_frame_header_is_connection_dropped() {
        let mut d = demux(&[0x24, 0x00]);
        assert!(matches!(d.read_frame(), Err(Error::ConnectionDropped(_))));
    }

    #[test]
    fn eof_mid_headers_is_connection_dropped() {
        let mut d = demux(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n");
        assert!(matches!(d.read_frame(), Err(Error::ConnectionDropped(_))));
    }

    #[test]
    fn truncated_body_is_connection_dropped() {
        let mut d = demux(b"RTSP/1.0 200 OK\r\nContent-Length: 10\r\n\r\nabc");
        assert!(matches!(d.read_frame(), Err(Error::ConnectionDropped(_))));
    }

    #[test]
    fn overlong_line_is_protocol_error() {
        let mut bytes = b"RTSP/1.0 200 OK\r\nX-Junk: ".to_vec();
        bytes.extend(std::iter::repeat_n(b'a', MAX_LINE_LEN as usize + 10));
        bytes.extend_from_slice(b"\r\n\r\n");
        let mut d = demux(&bytes);
        assert!(matches!(d.read_frame(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn oversized_content_length_is_protocol_error() {
        let huge = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 18446744073709551615\r\n\r\n";
        let mut d = demux(huge);
        assert!(matches!(
            d.read_frame(),
            Err(Error::Protocol {
                kind: ProtocolErrorKind::InvalidContentLength
            })
        ));

        let head = format!("RTSP/1.0 200 OK\r\nContent-Length: {}\r\n\r\n", MAX_BODY_LEN + 1);
        let mut d = demux(head.as_bytes());
        assert!(matches!(d.read_frame(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn body_at_limit_is_accepted() {
        let mut bytes =
            format!("RTSP/1.0 200 OK\r\nContent-Length: {MAX_BODY_LEN}\r\n\r\n").into_bytes();
        bytes.resize(bytes.len() + MAX_BODY_LEN, b'x');
        match demux(&bytes).read_frame().unwrap() {
            Frame::Message(m) => assert_eq!(m.body.len(), MAX_BODY_LEN),
            other => panic!("expected message, got {other:?}"),
        }
    }
}
