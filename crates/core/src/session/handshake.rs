use std::io::{BufRead, Write};

use super::{HandshakeStep, InterleavedChannels, RtspSession, SessionState, StreamSetup};
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::protocol::{Method, RtspRequest, RtspResponse, SessionDescription};
use crate::transport::{Demultiplexer, Frame};

impl RtspSession {
    /// Drive OPTIONS → DESCRIBE → SETUP → PLAY over an open connection.
    ///
    /// Any non-2xx answer to DESCRIBE, SETUP or PLAY fails the session.
    /// OPTIONS is a courtesy probe; a non-2xx answer is logged and ignored.
    pub fn handshake<R: BufRead, W: Write>(
        &mut self,
        demux: &mut Demultiplexer<R>,
        writer: &mut W,
    ) -> Result<StreamSetup> {
        let base_url = self.target.url().to_string();

        self.set_state(SessionState::Handshaking(HandshakeStep::Options));
        let request = self.request(Method::Options, &base_url);
        let options = self.transact(demux, writer, request)?;
        if options.is_success() {
            tracing::debug!(public = ?options.get_header("Public"), "OPTIONS");
        } else {
            tracing::debug!(status = options.status_code, "OPTIONS rejected, continuing");
        }

        self.set_state(SessionState::Handshaking(HandshakeStep::Describe));
        let request = self
            .request(Method::Describe, &base_url)
            .add_header("Accept", "application/sdp");
        let describe = self.transact(demux, writer, request)?.require_success()?;
        if describe.body.is_empty() {
            return Err(Error::protocol(ProtocolErrorKind::MissingBody));
        }

        let content_base = describe
            .get_header("Content-Base")
            .or_else(|| describe.get_header("Content-Location"))
            .unwrap_or(&base_url)
            .to_string();
        let sdp = SessionDescription::parse(&describe.body_text());
        let control_url = sdp.control_url(&content_base);

        if let Some(codec) = &sdp.codec
            && !codec.eq_ignore_ascii_case("H264")
        {
            tracing::warn!(codec, "stream is not H.264; NAL extraction will drop its payloads");
        }
        tracing::info!(
            control_url,
            payload_type = ?sdp.payload_type,
            parameter_sets = sdp.parameter_sets.len(),
            "DESCRIBE"
        );

        self.set_state(SessionState::Handshaking(HandshakeStep::Setup));
        let requested = InterleavedChannels::default();
        let request = self
            .request(Method::Setup, &control_url)
            .add_header("Transport", &requested.request_header());
        let setup = self.transact(demux, writer, request)?.require_success()?;

        let session_id = setup
            .session_id()
            .ok_or(Error::protocol(ProtocolErrorKind::MissingHeader("Session")))?
            .to_string();
        self.session_id = Some(session_id.clone());
        self.session_timeout = setup.session_timeout();

        let channels = setup
            .get_header("Transport")
            .and_then(InterleavedChannels::parse)
            .unwrap_or(requested);
        tracing::info!(
            session_id,
            rtp_channel = channels.rtp_channel,
            rtcp_channel = channels.rtcp_channel,
            timeout = ?self.session_timeout,
            "SETUP"
        );

        self.set_state(SessionState::Handshaking(HandshakeStep::Play));
        let request = self
            .request(Method::Play, &control_url)
            .add_header("Range", "npt=0.000-");
        let play = self.transact(demux, writer, request)?.require_success()?;
        tracing::info!(rtp_info = ?play.get_header("RTP-Info"), "PLAY");

        Ok(StreamSetup {
            control_url,
            session_id,
            channels,
            parameter_sets: sdp.parameter_sets,
            keepalive_interval: self.keepalive_interval(),
        })
    }

    /// Send GET_PARAMETER without waiting for the answer; the streaming
    /// loop discards it with every other text message.
    pub fn send_keepalive<W: Write>(&mut self, writer: &mut W, setup: &StreamSetup) -> Result<()> {
        let request = self.request(Method::GetParameter, &setup.control_url);
        tracing::trace!(cseq = request.cseq, "GET_PARAMETER keepalive");
        send(writer, &request)
    }

    /// Best-effort TEARDOWN; the response is not awaited.
    pub fn send_teardown<W: Write>(&mut self, writer: &mut W, setup: &StreamSetup) -> Result<()> {
        let request = self.request(Method::Teardown, &setup.control_url);
        tracing::debug!(session_id = %setup.session_id, "TEARDOWN");
        send(writer, &request)
    }

    /// Send one request and wait for its response.
    ///
    /// Binary frames and server-originated requests arriving in between
    /// are skipped. The response must echo our CSeq when it carries one.
    fn transact<R: BufRead, W: Write>(
        &mut self,
        demux: &mut Demultiplexer<R>,
        writer: &mut W,
        request: RtspRequest,
    ) -> Result<RtspResponse> {
        tracing::debug!(
            method = %request.method,
            uri = %request.uri,
            cseq = request.cseq,
            "request"
        );
        send(writer, &request)?;

        loop {
            let message = match demux.read_frame()? {
                Frame::Message(m) if m.is_response() => m,
                Frame::Message(m) => {
                    tracing::debug!(
                        start_line = %m.start_line,
                        "ignoring server request during handshake"
                    );
                    continue;
                }
                Frame::Data { channel, payload } => {
                    tracing::trace!(
                        channel,
                        len = payload.len(),
                        "ignoring early interleaved frame"
                    );
                    continue;
                }
            };

            let response = RtspResponse::from_message(message)?;
            tracing::debug!(
                method = %request.method,
                status = response.status_code,
                "response"
            );

            if let Some(cseq) = response.cseq()
                && cseq.trim().parse::<u32>().ok() != Some(request.cseq)
            {
                return Err(Error::protocol(ProtocolErrorKind::CSeqMismatch {
                    expected: request.cseq,
                    got: cseq.to_string(),
                }));
            }

            return Ok(response);
        }
    }
}

fn send<W: Write>(writer: &mut W, request: &RtspRequest) -> Result<()> {
    writer.write_all(request.serialize().as_bytes())?;
    writer.flush()?;
    Ok(())
}
