//! In-process publish/subscribe between pipeline stages.
//!
//! Stages never call each other: the snapshot stage publishes
//! [`Event::SnapshotReceived`], the detection stage consumes it and
//! publishes [`Event::FloatPositionDetected`], and so on. Each subscriber
//! gets its own queue and dispatch thread, so:
//!
//! - [`EventBus::publish`] never blocks on a handler.
//! - Each subscriber sees events in publish order.
//! - A handler that fails or panics is logged and keeps receiving; the
//!   producer and other subscribers are unaffected.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::level::LevelSample;
use crate::lifecycle::ControlSignal;

/// Error returned by a failing handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Discriminant used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SnapshotRequested,
    SnapshotReceived,
    FloatPositionDetected,
    LevelCalculated,
    Control,
}

/// Everything that travels on the bus. Immutable once published.
#[derive(Debug, Clone)]
pub enum Event {
    /// Grab the next decoded frame.
    SnapshotRequested,
    /// A decoded frame, as produced by the [`FrameDecoder`](crate::media::FrameDecoder).
    SnapshotReceived(Arc<[u8]>),
    /// Raw detector output in [0, 1].
    FloatPositionDetected(f64),
    /// A normalized sample that passed the hysteresis gate.
    LevelCalculated(LevelSample),
    /// Pause/resume for [`Controllable`](crate::lifecycle::Controllable) components.
    Control(ControlSignal),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SnapshotRequested => EventKind::SnapshotRequested,
            Self::SnapshotReceived(_) => EventKind::SnapshotReceived,
            Self::FloatPositionDetected(_) => EventKind::FloatPositionDetected,
            Self::LevelCalculated(_) => EventKind::LevelCalculated,
            Self::Control(_) => EventKind::Control,
        }
    }
}

struct Subscriber {
    id: u64,
    tx: Sender<Arc<Event>>,
}

#[derive(Default)]
struct Registry {
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
    /// Serializes fan-out so every subscriber observes one global order.
    publish: Mutex<()>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` for every current subscriber of its kind.
    ///
    /// Returns how many subscribers it was queued for. Never waits for a
    /// handler to run.
    pub fn publish(&self, event: Event) -> usize {
        let kind = event.kind();
        let event = Arc::new(event);

        let _order = self.registry.publish.lock();
        let subscribers = self.registry.subscribers.read();
        let Some(list) = subscribers.get(&kind) else {
            tracing::trace!(?kind, "published with no subscribers");
            return 0;
        };

        let mut delivered = 0;
        for sub in list {
            if sub.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::trace!(?kind, delivered, "published");
        delivered
    }

    /// Run `handler` on a dedicated thread for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = crossbeam_channel::unbounded();
        let active = Arc::new(AtomicBool::new(true));

        let worker_active = active.clone();
        let spawned = thread::Builder::new()
            .name(format!("bus-{kind:?}-{id}"))
            .spawn(move || dispatch(kind, id, rx, worker_active, handler));

        match spawned {
            Ok(_) => {
                self.registry
                    .subscribers
                    .write()
                    .entry(kind)
                    .or_default()
                    .push(Subscriber { id, tx });
                tracing::debug!(?kind, id, "subscribed");
            }
            Err(e) => {
                tracing::error!(?kind, error = %e, "failed to spawn dispatch thread");
                active.store(false, Ordering::SeqCst);
            }
        }

        Subscription {
            id,
            kind,
            registry: Arc::downgrade(&self.registry),
            active,
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry
            .subscribers
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

fn dispatch<F>(
    kind: EventKind,
    id: u64,
    rx: Receiver<Arc<Event>>,
    active: Arc<AtomicBool>,
    mut handler: F,
) where
    F: FnMut(&Event) -> HandlerResult,
{
    for event in rx.iter() {
        if !active.load(Ordering::SeqCst) {
            break;
        }
        match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(?kind, id, error = %e, "event handler failed"),
            Err(_) => tracing::error!(?kind, id, "event handler panicked"),
        }
    }
    tracing::trace!(?kind, id, "dispatch thread exiting");
}

/// Handle to one registration.
///
/// Dropping the handle leaves the subscription running for the lifetime of
/// the bus; [`cancel`](Self::cancel) ends it.
pub struct Subscription {
    id: u64,
    kind: EventKind,
    registry: Weak<Registry>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop delivery. Events still queued are discarded. Idempotent.
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut subscribers = registry.subscribers.write();
            if let Some(list) = subscribers.get_mut(&self.kind) {
                list.retain(|s| s.id != self.id);
            }
        }
        tracing::debug!(kind = ?self.kind, id = self.id, "subscription cancelled");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn delivers_in_publish_order() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let _sub = bus.subscribe(EventKind::FloatPositionDetected, move |e| {
            if let Event::FloatPositionDetected(v) = e {
                tx.send(*v)?;
            }
            Ok(())
        });

        for i in 0..100 {
            assert_eq!(bus.publish(Event::FloatPositionDetected(i as f64)), 1);
        }
        let got: Vec<f64> = (0..100).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        let expected: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let _sub = bus.subscribe(EventKind::SnapshotRequested, move |e| {
            tx.send(e.kind())?;
            Ok(())
        });
        assert_eq!(bus.publish(Event::FloatPositionDetected(0.5)), 0);
        bus.publish(Event::SnapshotRequested);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), EventKind::SnapshotRequested);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();

        let _failing = bus.subscribe(EventKind::SnapshotRequested, |_| Err("boom".into()));
        let mut calls = 0;
        let _panicking = bus.subscribe(EventKind::SnapshotRequested, move |_| {
            calls += 1;
            if calls == 1 {
                panic!("handler panic");
            }
            Ok(())
        });
        let _healthy = bus.subscribe(EventKind::SnapshotRequested, move |_| {
            tx.send(())?;
            Ok(())
        });

        assert_eq!(bus.publish(Event::SnapshotRequested), 3);
        assert_eq!(bus.publish(Event::SnapshotRequested), 3);
        rx.recv_timeout(WAIT).unwrap();
        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn cancel_is_idempotent_and_stops_delivery() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let sub = bus.subscribe(EventKind::Control, move |e| {
            tx.send(e.kind())?;
            Ok(())
        });
        assert_eq!(bus.subscriber_count(EventKind::Control), 1);

        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(EventKind::Control), 0);
        assert_eq!(bus.publish(Event::Control(ControlSignal::pause_all())), 0);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let subs: Vec<_> = (0..3)
            .map(|n| {
                let tx = tx.clone();
                bus.subscribe(EventKind::SnapshotRequested, move |_| {
                    tx.send(n)?;
                    Ok(())
                })
            })
            .collect();

        assert_eq!(bus.publish(Event::SnapshotRequested), 3);
        let mut got: Vec<i32> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        got.sort();
        assert_eq!(got, vec![0, 1, 2]);

        subs[1].cancel();
        assert_eq!(bus.publish(Event::SnapshotRequested), 2);
    }

    #[test]
    fn concurrent_publishers_keep_per_producer_order() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let _sub = bus.subscribe(EventKind::FloatPositionDetected, move |e| {
            if let Event::FloatPositionDetected(v) = e {
                tx.send(*v)?;
            }
            Ok(())
        });

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        bus.publish(Event::FloatPositionDetected((p * 1000 + i) as f64));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let got: Vec<f64> = (0..200).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        for p in 0..4 {
            let mine: Vec<f64> = got
                .iter()
                .copied()
                .filter(|v| (*v as i64) / 1000 == p)
                .collect();
            let expected: Vec<f64> = (0..50).map(|i| (p * 1000 + i) as f64).collect();
            assert_eq!(mine, expected);
        }
    }
}
