//! RTSP client session (RFC 2326 §3, §12.37).
//!
//! A session is the client-side state of one conversation with a camera:
//!
//! - The target URL and credentials ([`RtspTarget`]).
//! - The CSeq counter, starting at 1 and incremented per request.
//! - The session ID the server assigns at SETUP, echoed on every later
//!   request until the connection is torn down.
//!
//! ## Session lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Handshaking(Options -> Describe -> Setup -> Play) -> Streaming
//!       ^                                                                              |
//!       +------------------------ any error, from any state ---------------------------+
//! ```
//!
//! There is no terminal state: [`client::RtspClient`] waits a fixed delay in
//! `Disconnected` and starts over from `Connecting`, indefinitely.

pub mod client;
mod handshake;
mod stream;
pub mod target;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::media::NalUnit;
use crate::protocol::{Method, RtspRequest};
use crate::protocol::request::USER_AGENT;

pub use client::{MediaSink, RtspClient};
pub use target::{Credentials, RtspTarget};
pub use transport::InterleavedChannels;

/// Handshake step in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Options,
    Describe,
    Setup,
    Play,
}

/// Client session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Handshaking(HandshakeStep),
    /// PLAY succeeded; media is being read.
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Handshaking(step) => write!(f, "handshaking({step:?})"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

/// Current [`SessionState`] plus change listeners.
///
/// Written by the session loop, read by whoever owns the client.
#[derive(Debug, Default)]
pub struct StateCell {
    current: RwLock<SessionState>,
    listeners: Mutex<Vec<Sender<SessionState>>>,
}

impl StateCell {
    pub fn get(&self) -> SessionState {
        *self.current.read()
    }

    /// Receive every later transition. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SessionState> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    /// Returns the previous state.
    fn replace(&self, state: SessionState) -> SessionState {
        let old = std::mem::replace(&mut *self.current.write(), state);
        if old != state {
            self.listeners.lock().retain(|tx| tx.send(state).is_ok());
        }
        old
    }
}

/// What a successful handshake produced.
#[derive(Debug, Clone)]
pub struct StreamSetup {
    /// Resolved track URL used for SETUP and PLAY.
    pub control_url: String,
    pub session_id: String,
    pub channels: InterleavedChannels,
    /// SPS/PPS announced in the SDP, possibly empty.
    pub parameter_sets: Vec<NalUnit>,
    /// How often to send GET_PARAMETER while streaming.
    pub keepalive_interval: Duration,
}

/// Mutable per-connection state: CSeq, session ID, server timeout.
///
/// Owned by the session loop thread. Only the [`StateCell`] is shared.
pub struct RtspSession {
    target: RtspTarget,
    state: Arc<StateCell>,
    cseq: u32,
    session_id: Option<String>,
    session_timeout: Option<u64>,
    default_keepalive: Duration,
    user_agent: String,
}

impl RtspSession {
    pub fn new(target: RtspTarget, default_keepalive: Duration) -> Self {
        Self::with_state_cell(target, default_keepalive, Arc::default())
    }

    /// Publish state transitions through an existing cell.
    pub fn with_state_cell(
        target: RtspTarget,
        default_keepalive: Duration,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            target,
            state,
            cseq: 1,
            session_id: None,
            session_timeout: None,
            default_keepalive,
            user_agent: USER_AGENT.to_string(),
        }
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.user_agent = user_agent.into();
    }

    pub fn subscribe_state(&self) -> Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn target(&self) -> &RtspTarget {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The CSeq the next request will carry.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn set_state(&mut self, state: SessionState) {
        let old = self.state.replace(state);
        if old != state {
            tracing::debug!(
                target_url = %self.target,
                old_state = %old,
                new_state = %state,
                "state transition"
            );
        }
    }

    /// Tear down per-connection state.
    ///
    /// The next connection is a new RTSP session: the session ID is
    /// forgotten and CSeq restarts at 1.
    pub fn disconnect(&mut self) {
        self.session_id = None;
        self.session_timeout = None;
        self.cseq = 1;
        self.set_state(SessionState::Disconnected);
    }

    /// Build the next request: CSeq, optional Basic auth, `Session` once
    /// assigned, then `User-Agent`.
    pub fn request(&mut self, method: Method, uri: &str) -> RtspRequest {
        let cseq = self.cseq;
        self.cseq = self.cseq.wrapping_add(1);

        let mut request =
            RtspRequest::new(method, uri, cseq).authorization(self.target.credentials());
        if let Some(id) = &self.session_id {
            request = request.add_header("Session", id);
        }
        request.add_header("User-Agent", &self.user_agent)
    }

    /// Half the server's session timeout (RFC 2326 §12.37), else the
    /// configured default.
    fn keepalive_interval(&self) -> Duration {
        match self.session_timeout {
            Some(secs) if secs >= 2 => Duration::from_secs(secs / 2),
            _ => self.default_keepalive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> RtspSession {
        let target = RtspTarget::parse("rtsp://u:p@cam/stream").unwrap();
        RtspSession::new(target, Duration::from_secs(30))
    }

    #[test]
    fn cseq_starts_at_one_and_increments() {
        let mut s = session();
        let r1 = s.request(Method::Options, "rtsp://cam/stream");
        let r2 = s.request(Method::Describe, "rtsp://cam/stream");
        assert_eq!(r1.cseq, 1);
        assert_eq!(r2.cseq, 2);
        assert_eq!(s.cseq(), 3);
    }

    #[test]
    fn session_header_after_assignment() {
        let mut s = session();
        assert!(!s.request(Method::Options, "u").serialize().contains("Session:"));
        s.session_id = Some("ABCD".into());
        let wire = s.request(Method::Play, "u").serialize();
        assert!(wire.contains("Session: ABCD\r\n"));
        assert!(wire.contains("Authorization: Basic dTpw\r\n"));
    }

    #[test]
    fn disconnect_clears_identity() {
        let mut s = session();
        s.request(Method::Options, "u");
        s.session_id = Some("X".into());
        s.session_timeout = Some(60);
        s.set_state(SessionState::Streaming);
        s.disconnect();
        assert_eq!(s.session_id(), None);
        assert_eq!(s.cseq(), 1);
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.keepalive_interval(), Duration::from_secs(30));
    }

    #[test]
    fn keepalive_follows_server_timeout() {
        let mut s = session();
        s.session_timeout = Some(60);
        assert_eq!(s.keepalive_interval(), Duration::from_secs(30));
        s.session_timeout = Some(10);
        assert_eq!(s.keepalive_interval(), Duration::from_secs(5));
    }

    #[test]
    fn listeners_see_transitions_once() {
        let mut s = session();
        let rx = s.subscribe_state();
        s.set_state(SessionState::Connecting);
        s.set_state(SessionState::Connecting);
        s.set_state(SessionState::Handshaking(HandshakeStep::Describe));
        let seen: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                SessionState::Connecting,
                SessionState::Handshaking(HandshakeStep::Describe)
            ]
        );
    }
}
