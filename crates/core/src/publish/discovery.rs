use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use super::{PublishError, Publisher, Qos};
use crate::config::PublishConfig;

/// Retained sensor config document, Home Assistant MQTT discovery layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDocument {
    pub name: String,
    pub state_topic: String,
    pub unit_of_measurement: &'static str,
    pub value_template: &'static str,
    pub unique_id: String,
    pub state_class: &'static str,
    pub icon: &'static str,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
}

/// Announces the level sensor once per process lifetime.
///
/// The announced flag lives only in memory, so a restart (or
/// [`forget`](Self::forget), e.g. after the broker lost its retained
/// messages) announces again.
#[derive(Debug)]
pub struct DiscoveryRegistrar {
    config: PublishConfig,
    announced: AtomicBool,
}

impl DiscoveryRegistrar {
    pub fn new(config: PublishConfig) -> Self {
        Self {
            config,
            announced: AtomicBool::new(false),
        }
    }

    /// `<prefix>/sensor/<device_id>/level/config`
    pub fn config_topic(&self) -> String {
        format!(
            "{}/sensor/{}/level/config",
            self.config.discovery_prefix.trim_end_matches('/'),
            self.config.device_id
        )
    }

    pub fn document(&self) -> DiscoveryDocument {
        DiscoveryDocument {
            name: format!("{} Level", self.config.device_name),
            state_topic: self.config.state_topic(),
            unit_of_measurement: "%",
            value_template: "{{ value_json.percentage }}",
            unique_id: format!("{}_level", self.config.device_id),
            state_class: "measurement",
            icon: "mdi:gauge",
            device: DeviceInfo {
                identifiers: vec![self.config.device_id.clone()],
                name: self.config.device_name.clone(),
            },
        }
    }

    pub fn is_announced(&self) -> bool {
        self.announced.load(Ordering::SeqCst)
    }

    /// Publish the config document unless already done.
    ///
    /// Returns `true` if it was published by this call. A failed publish
    /// leaves the flag clear so the next call retries.
    pub fn ensure_announced(&self, publisher: &dyn Publisher) -> Result<bool, PublishError> {
        if self.is_announced() {
            return Ok(false);
        }
        let payload = serde_json::to_vec(&self.document())
            .map_err(|e| PublishError(format!("discovery document: {e}")))?;
        let topic = self.config_topic();
        publisher.publish(&topic, &payload, Qos::AtLeastOnce, true)?;
        self.announced.store(true, Ordering::SeqCst);
        tracing::info!(%topic, "discovery config announced");
        Ok(true)
    }

    pub fn forget(&self) {
        self.announced.store(false, Ordering::SeqCst);
    }
}
