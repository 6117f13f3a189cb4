//! Low-level discovery of vhosts and queues
//!
//! This module handles:
//! - Distinct vhost names seen in the current poll
//! - Distinct (vhost, queue) pairs seen in the current poll
//! - The `{#VHOST}` / `{#QUEUENAME}` label rendering used for registration

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::model::{QueueRecord, VhostRecord};

pub const VHOST_LABEL: &str = "{#VHOST}";
pub const QUEUE_LABEL: &str = "{#QUEUENAME}";

/// Which discovery list an item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryCategory {
    Vhost,
    Queue,
}

impl DiscoveryCategory {
    pub fn key(self) -> &'static str {
        match self {
            DiscoveryCategory::Vhost => "rabbitmq.vhost.LLD",
            DiscoveryCategory::Queue => "rabbitmq.queue.LLD",
        }
    }
}

/// One discovered entity: a vhost, or a queue inside a vhost
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryEntry {
    pub vhost: String,
    pub queue: Option<String>,
}

impl DiscoveryEntry {
    /// Placeholder name -> value pairs
    pub fn labels(&self) -> Vec<(&'static str, &str)> {
        let mut labels = vec![(VHOST_LABEL, self.vhost.as_str())];
        if let Some(queue) = &self.queue {
            labels.push((QUEUE_LABEL, queue.as_str()));
        }
        labels
    }

    pub fn to_json(&self) -> Value {
        let labels: Map<String, Value> = self
            .labels()
            .into_iter()
            .map(|(label, value)| (label.to_string(), Value::from(value)))
            .collect();
        Value::Object(labels)
    }
}

/// Distinct vhosts in encounter order
pub fn vhost_discovery(vhosts: &[VhostRecord]) -> Vec<DiscoveryEntry> {
    dedup(vhosts.iter().map(|vhost| DiscoveryEntry {
        vhost: vhost.name.clone(),
        queue: None,
    }))
}

/// Distinct (vhost, queue) pairs in encounter order
pub fn queue_discovery(queues: &[QueueRecord]) -> Vec<DiscoveryEntry> {
    dedup(queues.iter().map(|queue| DiscoveryEntry {
        vhost: queue.vhost.clone(),
        queue: Some(queue.name.clone()),
    }))
}

fn dedup(entries: impl Iterator<Item = DiscoveryEntry>) -> Vec<DiscoveryEntry> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for entry in entries {
        if seen.insert(entry.clone()) {
            unique.push(entry);
        } else {
            debug!("Dropping duplicate discovery entry: {:?}", entry);
        }
    }
    unique
}
