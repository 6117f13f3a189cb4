//! Broker records returned by the management API
//!
//! Typed views over the JSON documents the agent polls. All of them live for
//! one poll cycle only. Fields the extractor walks generically are kept as raw
//! JSON so scalar values reach the monitoring system untouched.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

use crate::error::AgentError;

/// Rendered in place of any version field the broker did not report.
pub const UNKNOWN: &str = "Unknown";

/// Suffix of the companion objects that only carry a `rate` for their sibling.
pub const DETAILS_SUFFIX: &str = "_details";

/// `/api/overview`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerOverview {
    pub rabbitmq_version: Option<String>,
    pub management_version: Option<String>,
    pub erlang_version: Option<String>,
    pub erlang_full_version: Option<String>,
}

impl BrokerOverview {
    pub fn broker_version(&self) -> &str {
        self.rabbitmq_version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn management_plugin_version(&self) -> &str {
        self.management_version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn runtime_version(&self) -> &str {
        self.erlang_version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn runtime_full_version(&self) -> &str {
        self.erlang_full_version.as_deref().unwrap_or(UNKNOWN)
    }
}

pub const STATE_COUNT: usize = 8;

/// AMQP connection lifecycle states, in the order the histogram stores them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Starting,
    Tuning,
    Opening,
    Running,
    Blocking,
    Blocked,
    Closing,
    Closed,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; STATE_COUNT] = [
        ConnectionState::Starting,
        ConnectionState::Tuning,
        ConnectionState::Opening,
        ConnectionState::Running,
        ConnectionState::Blocking,
        ConnectionState::Blocked,
        ConnectionState::Closing,
        ConnectionState::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Starting => "starting",
            ConnectionState::Tuning => "tuning",
            ConnectionState::Opening => "opening",
            ConnectionState::Running => "running",
            ConnectionState::Blocking => "blocking",
            ConnectionState::Blocked => "blocked",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `/api/connections`; only the fields the histogram needs
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionRecord {
    pub vhost: String,
    pub state: ConnectionState,
}

/// One entry of `/api/vhosts`
#[derive(Debug, Clone, Deserialize)]
pub struct VhostRecord {
    pub name: String,
    #[serde(default)]
    pub message_stats: Option<Map<String, Value>>,
    #[serde(default)]
    pub tracing: bool,
    /// Everything else: counters and their `_details` companions.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl VhostRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn rate(&self, name: &str) -> Option<&Value> {
        detail_rate(&self.fields, name)
    }
}

/// Fields every well-formed queue record carries.
pub const QUEUE_REQUIRED_FIELDS: [&str; 6] = [
    "auto_delete",
    "consumers",
    "durable",
    "idle_since",
    "memory",
    "status",
];

/// One entry of `/api/queues`, keyed by (vhost, name)
#[derive(Debug, Clone, Deserialize)]
pub struct QueueRecord {
    pub vhost: String,
    pub name: String,
    pub auto_delete: Value,
    pub consumers: Value,
    pub durable: Value,
    pub idle_since: Value,
    pub memory: Value,
    pub status: Value,
    #[serde(default)]
    pub backing_queue_status: Map<String, Value>,
    #[serde(default)]
    pub message_stats: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl QueueRecord {
    /// The required fields, paired with their names, in `QUEUE_REQUIRED_FIELDS` order
    pub fn required_fields(&self) -> [(&'static str, &Value); 6] {
        [
            (QUEUE_REQUIRED_FIELDS[0], &self.auto_delete),
            (QUEUE_REQUIRED_FIELDS[1], &self.consumers),
            (QUEUE_REQUIRED_FIELDS[2], &self.durable),
            (QUEUE_REQUIRED_FIELDS[3], &self.idle_since),
            (QUEUE_REQUIRED_FIELDS[4], &self.memory),
            (QUEUE_REQUIRED_FIELDS[5], &self.status),
        ]
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn rate(&self, name: &str) -> Option<&Value> {
        detail_rate(&self.fields, name)
    }
}

/// `<name>_details.rate` from the same object as `<name>`
pub fn detail_rate<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object
        .get(&format!("{name}{DETAILS_SUFFIX}"))
        .and_then(|details| details.get("rate"))
}

/// Decode a JSON array response one element at a time.
///
/// Elements that do not fit `T` are logged and skipped so a single odd record
/// never costs the whole cycle. A body that is not an array yields nothing.
pub fn decode_records<T: DeserializeOwned>(kind: &'static str, document: Value) -> Vec<T> {
    let Value::Array(entries) = document else {
        warn!("Expected a JSON array of {} records, skipping", kind);
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                let err = AgentError::MalformedRecord {
                    kind,
                    reason: e.to_string(),
                };
                warn!("Skipping record: {}", err);
                None
            }
        })
        .collect()
}
