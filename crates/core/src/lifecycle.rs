//! Pause/resume for long-running components.
//!
//! A paused component stays constructed and keeps its threads; it only
//! stops doing side-effecting work (streaming, publishing, triggering)
//! until resumed. Operators toggle components by publishing
//! [`Event::Control`] on the bus; [`bind_control`] wires a component to it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Deserialize;

use crate::bus::{Event, EventBus, EventKind, Subscription};

/// A component that can be paused and resumed at runtime.
pub trait Controllable: Send + Sync {
    /// Name matched against [`ControlSignal::target`].
    fn name(&self) -> &str;

    fn on_start(&self);

    fn on_stop(&self);

    fn is_running(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Resume,
    Pause,
}

/// Operator command. An untargeted signal applies to every bound component.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlSignal {
    pub action: ControlAction,
    #[serde(default)]
    pub target: Option<String>,
}

impl ControlSignal {
    pub fn pause_all() -> Self {
        Self {
            action: ControlAction::Pause,
            target: None,
        }
    }

    pub fn resume_all() -> Self {
        Self {
            action: ControlAction::Resume,
            target: None,
        }
    }

    pub fn pause(name: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Pause,
            target: Some(name.into()),
        }
    }

    pub fn resume(name: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Resume,
            target: Some(name.into()),
        }
    }

    pub fn applies_to(&self, name: &str) -> bool {
        self.target.as_deref().is_none_or(|t| t == name)
    }

    /// Apply to `component` if addressed to it. Returns whether it was.
    pub fn apply(&self, component: &dyn Controllable) -> bool {
        if !self.applies_to(component.name()) {
            return false;
        }
        match self.action {
            ControlAction::Resume => component.on_start(),
            ControlAction::Pause => component.on_stop(),
        }
        true
    }
}

/// Route [`Event::Control`] signals on `bus` to `component`.
pub fn bind_control(bus: &EventBus, component: Arc<dyn Controllable>) -> Subscription {
    bus.subscribe(EventKind::Control, move |event| {
        if let Event::Control(signal) = event
            && signal.apply(component.as_ref())
        {
            tracing::info!(
                component = component.name(),
                action = ?signal.action,
                running = component.is_running(),
                "control signal applied"
            );
        }
        Ok(())
    })
}

/// Running/paused flag plus a permanent shutdown flag, with blocking waits
/// that wake on either.
///
/// Backs the worker loops of the session client and the snapshot
/// scheduler.
#[derive(Debug)]
pub struct RunSwitch {
    running: AtomicBool,
    shutdown: AtomicBool,
    /// Bumped on every change, so a sleeper notices a pause/resume pair.
    epoch: AtomicU64,
    lock: Mutex<()>,
    changed: Condvar,
}

impl RunSwitch {
    pub fn new(running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            shutdown: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            lock: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Paused or shut down.
    pub fn is_halted(&self) -> bool {
        !self.is_running() || self.is_shutdown()
    }

    /// Returns the previous value.
    pub fn set_running(&self, running: bool) -> bool {
        let previous = self.running.swap(running, Ordering::SeqCst);
        if previous != running {
            self.notify();
        }
        previous
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Clear a previous shutdown so the owner can be restarted.
    pub fn rearm(&self) {
        self.shutdown.store(false, Ordering::SeqCst);
    }

    /// Block while paused. Returns `false` once shut down.
    pub fn wait_running(&self) -> bool {
        let mut guard = self.lock.lock();
        while !self.is_running() && !self.is_shutdown() {
            self.changed.wait(&mut guard);
        }
        !self.is_shutdown()
    }

    /// Sleep for `duration` unless the switch changes first.
    ///
    /// Returns `true` if the full duration elapsed undisturbed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock();
        let epoch = self.epoch.load(Ordering::SeqCst);
        let undisturbed = || !self.is_halted() && self.epoch.load(Ordering::SeqCst) == epoch;
        while undisturbed() {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                return undisturbed();
            }
        }
        false
    }

    fn notify(&self) {
        // Taking the lock orders the flag store before any waiter's re-check.
        let _guard = self.lock.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_all();
    }
}

impl Default for RunSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Toggle {
        name: &'static str,
        running: AtomicBool,
    }

    impl Controllable for Toggle {
        fn name(&self) -> &str {
            self.name
        }
        fn on_start(&self) {
            self.running.store(true, Ordering::SeqCst);
        }
        fn on_stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }
        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn toggle(name: &'static str) -> Arc<Toggle> {
        Arc::new(Toggle {
            name,
            running: AtomicBool::new(true),
        })
    }

    #[test]
    fn targeted_signal_only_hits_named_component() {
        let a = toggle("reporter");
        let b = toggle("rtsp-session");
        assert!(ControlSignal::pause("reporter").apply(a.as_ref()));
        assert!(!ControlSignal::pause("reporter").apply(b.as_ref()));
        assert!(!a.is_running());
        assert!(b.is_running());

        assert!(ControlSignal::resume_all().apply(a.as_ref()));
        assert!(a.is_running());
    }

    #[test]
    fn signal_deserializes_from_json() {
        let s: ControlSignal = serde_json::from_str(r#"{"action":"pause"}"#).unwrap();
        assert_eq!(s, ControlSignal::pause_all());
        let s: ControlSignal =
            serde_json::from_str(r#"{"action":"resume","target":"scheduler"}"#).unwrap();
        assert_eq!(s, ControlSignal::resume("scheduler"));
    }

    #[test]
    fn bound_component_follows_bus_signals() {
        let bus = EventBus::new();
        let component = toggle("reporter");
        let _sub = bind_control(&bus, component.clone());

        bus.publish(Event::Control(ControlSignal::pause_all()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while component.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!component.is_running());

        bus.publish(Event::Control(ControlSignal::resume("reporter")));
        while !component.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(component.is_running());
    }

    #[test]
    fn wait_running_wakes_on_resume_and_shutdown() {
        let switch = Arc::new(RunSwitch::new(false));
        let waiter = {
            let switch = switch.clone();
            thread::spawn(move || switch.wait_running())
        };
        thread::sleep(Duration::from_millis(20));
        switch.set_running(true);
        assert!(waiter.join().unwrap());

        switch.set_running(false);
        let waiter = {
            let switch = switch.clone();
            thread::spawn(move || switch.wait_running())
        };
        thread::sleep(Duration::from_millis(20));
        switch.shutdown();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn sleep_is_cut_short_by_pause() {
        let switch = Arc::new(RunSwitch::new(true));
        assert!(switch.sleep(Duration::from_millis(10)));

        let sleeper = {
            let switch = switch.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (switch.sleep(Duration::from_secs(30)), start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        switch.set_running(false);
        let (completed, elapsed) = sleeper.join().unwrap();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }
}
