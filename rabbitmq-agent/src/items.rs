//! Delivery-ready items
//!
//! The last step before the queue: fully qualified key, value, host tag and clock.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::discovery::{DiscoveryCategory, DiscoveryEntry};
use crate::metrics::{coerce, MetricSample};

/// What the delivery sink receives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverableItem {
    pub host: String,
    pub key: String,
    pub value: Value,
    /// Unix timestamp (seconds) at formatting time
    pub clock: i64,
}

#[derive(Debug, Clone)]
pub struct ItemFormatter {
    host: String,
}

impl ItemFormatter {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn format_metric(&self, sample: &MetricSample) -> DeliverableItem {
        DeliverableItem {
            host: sample.host.clone(),
            key: sample.key.to_string(),
            value: coerce(sample.value.clone()),
            clock: Utc::now().timestamp(),
        }
    }

    /// `None` for an empty list: no discovery item is sent rather than an empty one
    pub fn format_discovery(
        &self,
        category: DiscoveryCategory,
        entries: &[DiscoveryEntry],
    ) -> Option<DeliverableItem> {
        if entries.is_empty() {
            return None;
        }

        let list = Value::Array(entries.iter().map(DiscoveryEntry::to_json).collect());
        Some(DeliverableItem {
            host: self.host.clone(),
            key: category.key().to_string(),
            value: Value::String(list.to_string()),
            clock: Utc::now().timestamp(),
        })
    }
}
