//! Stage glue between the session, the external decoder/detector, the
//! level pipeline and the bus.
//!
//! ```text
//! SnapshotScheduler --SnapshotRequested--> SnapshotStage (MediaSink on the session thread)
//!   --SnapshotReceived--> detector --FloatPositionDetected--> LevelPipeline --LevelCalculated-->
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::{Event, EventBus, EventKind, Subscription};
use crate::config::SnapshotMode;
use crate::error::{Error, Result};
use crate::level::{LevelDetector, LevelPipeline};
use crate::lifecycle::{Controllable, RunSwitch};
use crate::media::{AccessUnit, FrameDecoder, NalUnit};
use crate::session::MediaSink;

/// Feeds every access unit to the decoder and publishes decoded frames
/// as [`Event::SnapshotReceived`] when one was requested.
///
/// In [`SnapshotMode::Continuous`] every decoded frame is published.
pub struct SnapshotStage<D> {
    decoder: D,
    bus: EventBus,
    mode: SnapshotMode,
    requested: Arc<AtomicBool>,
    subscription: Subscription,
    decoded: u64,
}

impl<D: FrameDecoder> SnapshotStage<D> {
    pub fn new(decoder: D, bus: &EventBus, mode: SnapshotMode) -> Self {
        let requested = Arc::new(AtomicBool::new(false));
        let flag = requested.clone();
        let subscription = bus.subscribe(EventKind::SnapshotRequested, move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        Self {
            decoder,
            bus: bus.clone(),
            mode,
            requested,
            subscription,
            decoded: 0,
        }
    }

    /// Frames decoded so far, published or not.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    fn wants_frame(&self) -> bool {
        match self.mode {
            SnapshotMode::Continuous => true,
            SnapshotMode::Interval => self.requested.swap(false, Ordering::SeqCst),
        }
    }
}

impl<D: FrameDecoder> MediaSink for SnapshotStage<D> {
    fn on_session_start(&mut self, parameter_sets: &[NalUnit]) {
        self.decoder.parameter_sets(parameter_sets);
    }

    fn on_access_unit(&mut self, access_unit: AccessUnit) {
        let frame = match self.decoder.decode(&access_unit.nal_units) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    ts = access_unit.timestamp,
                    error = %e,
                    "skipping undecodable access unit"
                );
                return;
            }
        };
        self.decoded += 1;

        if self.wants_frame() {
            tracing::debug!(
                width = frame.width,
                height = frame.height,
                bytes = frame.data.len(),
                "snapshot"
            );
            self.bus.publish(Event::SnapshotReceived(frame.data.into()));
        }
    }
}

impl<D> Drop for SnapshotStage<D> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

/// Run `detector` on every snapshot and publish its raw position.
///
/// A failed detection is logged and reported as 0.0.
pub fn attach_detector<T>(bus: &EventBus, mut detector: T) -> Subscription
where
    T: LevelDetector + 'static,
{
    let out = bus.clone();
    bus.subscribe(EventKind::SnapshotReceived, move |event| {
        if let Event::SnapshotReceived(frame) = event {
            let position = detector.detect(frame).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "float detection failed, substituting 0.0");
                0.0
            });
            tracing::debug!(position, "float position");
            out.publish(Event::FloatPositionDetected(position));
        }
        Ok(())
    })
}

/// Run raw positions through `pipeline`, publishing samples that pass
/// the hysteresis gate.
pub fn attach_level_pipeline(bus: &EventBus, mut pipeline: LevelPipeline) -> Subscription {
    let out = bus.clone();
    bus.subscribe(EventKind::FloatPositionDetected, move |event| {
        if let Event::FloatPositionDetected(raw) = event
            && let Some(sample) = pipeline.process(*raw)
        {
            tracing::info!(
                level = sample.level,
                percentage = sample.percentage,
                raw = sample.raw,
                "level calculated"
            );
            out.publish(Event::LevelCalculated(sample));
        }
        Ok(())
    })
}

/// Publishes [`Event::SnapshotRequested`] on a fixed interval, the first
/// one immediately on start.
pub struct SnapshotScheduler {
    interval: Duration,
    bus: EventBus,
    switch: Arc<RunSwitch>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotScheduler {
    pub fn new(bus: &EventBus, interval: Duration) -> Self {
        Self {
            interval,
            bus: bus.clone(),
            switch: Arc::new(RunSwitch::new(true)),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        if self.interval.is_zero() {
            return Err(Error::Config("snapshot interval must be positive".into()));
        }
        self.switch.rearm();

        let switch = self.switch.clone();
        let bus = self.bus.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("snapshot-scheduler".to_string())
            .spawn(move || {
                while switch.wait_running() {
                    tracing::debug!("requesting snapshot");
                    bus.publish(Event::SnapshotRequested);
                    switch.sleep(interval);
                }
            })?;
        *worker = Some(handle);
        tracing::info!(interval = ?self.interval, "snapshot scheduler started");
        Ok(())
    }

    pub fn shutdown(&self) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Err(Error::NotStarted);
        };
        self.switch.shutdown();
        if handle.join().is_err() {
            tracing::error!("snapshot scheduler thread panicked");
        }
        Ok(())
    }
}

impl Controllable for SnapshotScheduler {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn on_start(&self) {
        self.switch.set_running(true);
    }

    fn on_stop(&self) {
        self.switch.set_running(false);
    }

    fn is_running(&self) -> bool {
        self.switch.is_running()
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
