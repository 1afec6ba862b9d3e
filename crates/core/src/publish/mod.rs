//! Outbound level reports.
//!
//! The wire client (MQTT or otherwise) sits behind [`Publisher`]. This
//! module decides what goes on which topic:
//!
//! | Topic                                   | Payload                  | Retained |
//! |-----------------------------------------|--------------------------|----------|
//! | `<prefix>/sensor/<device>/level/config` | [`DiscoveryDocument`]    | yes      |
//! | `<base_topic>/state`                    | [`StateDocument`]        | yes      |
//!
//! [`StateDocument`]: crate::level::StateDocument

pub mod discovery;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::bus::{Event, EventBus, EventKind, Subscription};
use crate::config::PublishConfig;
use crate::level::LevelSample;
use crate::lifecycle::Controllable;

pub use discovery::{DiscoveryDocument, DiscoveryRegistrar};

/// Delivery guarantee requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Message transport. Implementations handle their own reconnects;
/// callers do not retry.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), PublishError>;
}

/// Publishes every [`Event::LevelCalculated`] as a retained state document.
///
/// While paused, samples are dropped without touching the publisher.
pub struct LevelReporter {
    publisher: Arc<dyn Publisher>,
    state_topic: String,
    discovery: Option<DiscoveryRegistrar>,
    running: AtomicBool,
    published: AtomicU64,
}

impl LevelReporter {
    pub fn new(publisher: Arc<dyn Publisher>, config: PublishConfig) -> Self {
        let state_topic = config.state_topic();
        let discovery = config.discovery.then(|| DiscoveryRegistrar::new(config));
        Self {
            publisher,
            state_topic,
            discovery,
            running: AtomicBool::new(true),
            published: AtomicU64::new(0),
        }
    }

    pub fn discovery(&self) -> Option<&DiscoveryRegistrar> {
        self.discovery.as_ref()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publish `sample`, announcing discovery first if needed.
    ///
    /// Returns `Ok(false)` when paused. A discovery failure is logged and
    /// does not hold back the state update.
    pub fn report(&self, sample: &LevelSample) -> Result<bool, PublishError> {
        if !self.is_running() {
            tracing::debug!(level = sample.level, "reporter paused, dropping sample");
            return Ok(false);
        }

        if let Some(discovery) = &self.discovery
            && let Err(e) = discovery.ensure_announced(self.publisher.as_ref())
        {
            tracing::warn!(error = %e, "discovery announce failed");
        }

        let payload = serde_json::to_vec(&sample.state_document())
            .map_err(|e| PublishError(format!("state document: {e}")))?;
        self.publisher
            .publish(&self.state_topic, &payload, Qos::AtLeastOnce, true)?;
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            topic = %self.state_topic,
            percentage = sample.percentage,
            "level published"
        );
        Ok(true)
    }

    /// Report every [`Event::LevelCalculated`] on `bus`.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Subscription {
        let reporter = self.clone();
        bus.subscribe(EventKind::LevelCalculated, move |event| {
            if let Event::LevelCalculated(sample) = event
                && let Err(e) = reporter.report(sample)
            {
                tracing::warn!(topic = %reporter.state_topic, error = %e, "level publish failed");
            }
            Ok(())
        })
    }
}

impl Controllable for LevelReporter {
    fn name(&self) -> &str {
        "reporter"
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
