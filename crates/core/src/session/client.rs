//! Long-running RTSP client with fixed-delay reconnect.
//!
//! [`RtspClient`] owns one worker thread. The worker connects, runs the
//! handshake, then reads interleaved media until the connection fails.
//! Whatever the failure, it waits `reconnect_delay` and starts over. It
//! never gives up on its own; only [`RtspClient::shutdown`] ends it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use super::stream::StreamReader;
use super::{RtspSession, RtspTarget, SessionState, StateCell};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{Controllable, RunSwitch};
use crate::media::{AccessUnit, NalUnit};
use crate::transport::Demultiplexer;
use crate::transport::tcp::{Connection, Interrupter};

/// Consumer of reassembled video, driven from the session thread.
pub trait MediaSink: Send {
    /// Called after every successful PLAY with the SPS/PPS from the SDP,
    /// which may be empty.
    fn on_session_start(&mut self, _parameter_sets: &[NalUnit]) {}

    fn on_access_unit(&mut self, access_unit: AccessUnit);
}

struct Shared {
    switch: RunSwitch,
    state: Arc<StateCell>,
    /// Interrupter for the connection currently open, if any.
    active: Mutex<Option<Interrupter>>,
}

impl Shared {
    fn interrupt_active(&self) {
        if let Some(interrupter) = self.active.lock().as_ref() {
            interrupter.interrupt();
        }
    }
}

/// Clears and closes the registered connection when the attempt ends.
struct ActiveGuard<'a>(&'a Shared);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Some(interrupter) = self.0.active.lock().take() {
            interrupter.close();
        }
    }
}

/// RTSP pull client.
///
/// Implements [`Controllable`]: pausing closes the connection (with a
/// best-effort TEARDOWN) and holds the worker idle until resumed.
pub struct RtspClient {
    config: SessionConfig,
    target: RtspTarget,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RtspClient {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let target = RtspTarget::parse(&config.url)?;
        Ok(Self {
            config,
            target,
            shared: Arc::new(Shared {
                switch: RunSwitch::new(true),
                state: Arc::default(),
                active: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn target(&self) -> &RtspTarget {
        &self.target
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Receive every later state transition.
    pub fn subscribe_state(&self) -> Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Spawn the session thread, feeding media to `sink`.
    pub fn start(&self, sink: Box<dyn MediaSink>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        self.shared.switch.rearm();

        let shared = self.shared.clone();
        let target = self.target.clone();
        let config = self.config.clone();
        let handle = thread::Builder::new()
            .name("rtsp-session".to_string())
            .spawn(move || run_loop(target, config, shared, sink))?;

        tracing::info!(target_url = %self.target, "RTSP client started");
        *worker = Some(handle);
        Ok(())
    }

    /// Stop the session thread and wait for it to exit.
    ///
    /// A blocked read is interrupted and an established session gets a
    /// TEARDOWN. The client can be started again afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Err(Error::NotStarted);
        };
        self.shared.switch.shutdown();
        self.shared.interrupt_active();
        if handle.join().is_err() {
            tracing::error!("RTSP session thread panicked");
        }
        tracing::info!(target_url = %self.target, "RTSP client stopped");
        Ok(())
    }
}

impl Controllable for RtspClient {
    fn name(&self) -> &str {
        "rtsp-session"
    }

    fn on_start(&self) {
        if !self.shared.switch.set_running(true) {
            tracing::info!(target_url = %self.target, "RTSP client resumed");
        }
    }

    fn on_stop(&self) {
        if self.shared.switch.set_running(false) {
            tracing::info!(target_url = %self.target, "RTSP client paused");
        }
        self.shared.interrupt_active();
    }

    fn is_running(&self) -> bool {
        self.shared.switch.is_running()
    }
}

impl Drop for RtspClient {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_loop(
    target: RtspTarget,
    config: SessionConfig,
    shared: Arc<Shared>,
    mut sink: Box<dyn MediaSink>,
) {
    let mut session =
        RtspSession::with_state_cell(target, config.keepalive_interval, shared.state.clone());
    session.set_user_agent(config.user_agent.as_str());
    let mut attempt: u64 = 0;

    while shared.switch.wait_running() {
        attempt += 1;
        let result = run_once(&mut session, &config, &shared, &mut *sink);
        session.disconnect();

        match result {
            Ok(()) => {
                tracing::info!(target_url = %session.target(), "session closed");
                attempt = 0;
                continue;
            }
            Err(e) if e.is_protocol() => tracing::warn!(
                target_url = %session.target(),
                attempt,
                error = %e,
                retry_in = ?config.reconnect_delay,
                "RTSP handshake rejected"
            ),
            Err(e) => tracing::warn!(
                target_url = %session.target(),
                attempt,
                error = %e,
                retry_in = ?config.reconnect_delay,
                "RTSP connection failed"
            ),
        }

        // Paused or shut down mid-delay: the loop condition decides.
        shared.switch.sleep(config.reconnect_delay);
    }

    session.disconnect();
    tracing::debug!("session loop exiting");
}

/// One connection attempt, from TCP connect to the end of the stream.
///
/// `Ok(())` means the attempt was cut short by a pause or shutdown.
fn run_once(
    session: &mut RtspSession,
    config: &SessionConfig,
    shared: &Shared,
    sink: &mut dyn MediaSink,
) -> Result<()> {
    session.set_state(SessionState::Connecting);
    let conn = Connection::open(session.target(), config.connect_timeout, config.io_timeout)?;

    *shared.active.lock() = Some(conn.interrupter()?);
    let _guard = ActiveGuard(shared);
    if shared.switch.is_halted() {
        return Ok(());
    }

    let Connection {
        reader, mut writer, ..
    } = conn;
    let mut demux = Demultiplexer::new(reader);

    let setup = match session.handshake(&mut demux, &mut writer) {
        Ok(setup) => setup,
        Err(_) if shared.switch.is_halted() => return Ok(()),
        Err(e) => return Err(e),
    };

    sink.on_session_start(&setup.parameter_sets);
    session.set_state(SessionState::Streaming);
    tracing::info!(
        target_url = %session.target(),
        session_id = %setup.session_id,
        control_url = %setup.control_url,
        keepalive = ?setup.keepalive_interval,
        "streaming"
    );

    let mut reader = StreamReader::new();
    let result = reader.run(session, &mut demux, &mut writer, &setup, sink);
    tracing::debug!(
        packets = reader.packets,
        dropped = reader.dropped,
        "stream ended"
    );

    if shared.switch.is_halted() {
        if let Err(e) = session.send_teardown(&mut writer, &setup) {
            tracing::debug!(error = %e, "TEARDOWN not delivered");
        }
        return Ok(());
    }
    result
}
