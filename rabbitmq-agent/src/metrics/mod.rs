//! Metric extraction for RabbitMQ agents
//!
//! Turns broker records into flat, uniquely keyed samples:
//! - Per-vhost message counters, their rates and connection states
//! - Per-queue properties, backing queue counters and publish rates
//! - Broker/runtime versions from the overview
//! - Agent heartbeat and version

pub mod connections;

use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::model::{detail_rate, BrokerOverview, ConnectionState, QueueRecord, VhostRecord};
pub use connections::ConnectionHistogram;

/// Vhost counters emitted together with their `.rate` companion
pub const VHOST_COUNTERS: [&str; 5] = [
    "messages",
    "messages_ready",
    "messages_unacknowledged",
    "recv_oct",
    "send_oct",
];

/// `message_stats` entries reported per vhost
pub const VHOST_MESSAGE_STATS: [&str; 2] = ["confirm", "publish"];

/// Queue counters emitted together with their `.rate` companion
pub const QUEUE_COUNTERS: [&str; 2] = ["messages", "messages_ready"];

/// Never expanded out of `backing_queue_status`.
pub const BACKING_QUEUE_EXCLUDED: [&str; 1] = ["delta"];

const VHOST_PREFIX: &str = "rabbitmq.stat.vhost";
const QUEUE_PREFIX: &str = "rabbitmq.stat.queue";

pub const VERSION_KEY: &str = "rabbitmq.version";
pub const MANAGEMENT_VERSION_KEY: &str = "rabbitmq.management.version";
pub const ERLANG_VERSION_KEY: &str = "rabbitmq.erlang.version";
pub const ERLANG_FULL_VERSION_KEY: &str = "rabbitmq.erlang.full.version";
pub const AGENT_PING_KEY: &str = "rabbitmq.agent.ping";
pub const AGENT_VERSION_KEY: &str = "rabbitmq.agent.version";

/// What a metric is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Scope {
    /// Fixed, bracket-less key such as `rabbitmq.version`
    Global(&'static str),
    Vhost { vhost: String },
    Queue { vhost: String, queue: String },
}

/// Fully qualified metric key, rendered with `Display`:
/// `rabbitmq.stat.vhost[<vhost>,<field>[,<subfield>][,rate]]` or
/// `rabbitmq.stat.queue[<vhost>,<queue>,<field>[,<subfield>][,rate]]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    scope: Scope,
    field: String,
    subfield: Option<String>,
    rate: bool,
}

impl MetricKey {
    pub fn global(name: &'static str) -> Self {
        Self {
            scope: Scope::Global(name),
            field: String::new(),
            subfield: None,
            rate: false,
        }
    }

    pub fn vhost(vhost: &str, field: &str) -> Self {
        Self {
            scope: Scope::Vhost {
                vhost: vhost.to_string(),
            },
            field: field.to_string(),
            subfield: None,
            rate: false,
        }
    }

    pub fn queue(vhost: &str, queue: &str, field: &str) -> Self {
        Self {
            scope: Scope::Queue {
                vhost: vhost.to_string(),
                queue: queue.to_string(),
            },
            field: field.to_string(),
            subfield: None,
            rate: false,
        }
    }

    pub fn sub(mut self, subfield: &str) -> Self {
        self.subfield = Some(subfield.to_string());
        self
    }

    pub fn rate(mut self) -> Self {
        self.rate = true;
        self
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Global(name) => return f.write_str(name),
            Scope::Vhost { vhost } => write!(f, "{VHOST_PREFIX}[{vhost},{}", self.field)?,
            Scope::Queue { vhost, queue } => {
                write!(f, "{QUEUE_PREFIX}[{vhost},{queue},{}", self.field)?
            }
        }
        if let Some(subfield) = &self.subfield {
            write!(f, ",{subfield}")?;
        }
        if self.rate {
            f.write_str(",rate")?;
        }
        f.write_str("]")
    }
}

/// One host-tagged value ready for formatting
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub key: MetricKey,
    pub value: Value,
    pub host: String,
}

impl MetricSample {
    /// Holds the raw broker value; coercion happens when the item is formatted.
    pub fn new(key: MetricKey, value: Value, host: &str) -> Self {
        Self {
            key,
            value,
            host: host.to_string(),
        }
    }
}

/// `true` -> 1, `false` -> 0, any other value unchanged
pub fn coerce(value: Value) -> Value {
    match value {
        Value::Bool(flag) => Value::from(u8::from(flag)),
        other => other,
    }
}

/// Builds samples for one configured host tag
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    host: String,
}

impl MetricExtractor {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    fn sample(&self, key: MetricKey, value: &Value) -> MetricSample {
        MetricSample::new(key, value.clone(), &self.host)
    }

    /// Samples for every vhost, with connection states looked up in `histogram`
    pub fn extract_vhost_metrics(
        &self,
        vhosts: &[VhostRecord],
        histogram: &ConnectionHistogram,
    ) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for vhost in vhosts {
            self.extract_vhost(vhost, histogram, &mut samples);
        }
        debug!("Extracted {} samples from {} vhosts", samples.len(), vhosts.len());
        samples
    }

    fn extract_vhost(
        &self,
        vhost: &VhostRecord,
        histogram: &ConnectionHistogram,
        samples: &mut Vec<MetricSample>,
    ) {
        let name = vhost.name.as_str();

        if let Some(stats) = &vhost.message_stats {
            for stat in VHOST_MESSAGE_STATS {
                if let Some(value) = stats.get(stat) {
                    samples.push(self.sample(MetricKey::vhost(name, stat), value));
                }
                if let Some(rate) = detail_rate(stats, stat) {
                    samples.push(self.sample(MetricKey::vhost(name, stat).rate(), rate));
                }
            }
        }

        for field in VHOST_COUNTERS {
            let Some(value) = vhost.field(field) else {
                continue;
            };
            samples.push(self.sample(MetricKey::vhost(name, field), value));
            if let Some(rate) = vhost.rate(field) {
                samples.push(self.sample(MetricKey::vhost(name, field).rate(), rate));
            }
        }

        samples.push(self.sample(MetricKey::vhost(name, "tracing"), &Value::Bool(vhost.tracing)));

        for state in ConnectionState::ALL {
            let count = histogram.count(name, state);
            samples.push(self.sample(
                MetricKey::vhost(name, &format!("connection_{state}")),
                &Value::from(count),
            ));
        }
    }

    /// Samples for every queue
    pub fn extract_queue_metrics(&self, queues: &[QueueRecord]) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for queue in queues {
            self.extract_queue(queue, &mut samples);
        }
        debug!("Extracted {} samples from {} queues", samples.len(), queues.len());
        samples
    }

    fn extract_queue(&self, queue: &QueueRecord, samples: &mut Vec<MetricSample>) {
        let (vhost, name) = (queue.vhost.as_str(), queue.name.as_str());

        for (field, value) in queue.required_fields() {
            samples.push(self.sample(MetricKey::queue(vhost, name, field), value));
        }

        for (key, value) in &queue.backing_queue_status {
            if BACKING_QUEUE_EXCLUDED.contains(&key.as_str()) {
                continue;
            }
            samples.push(self.sample(
                MetricKey::queue(vhost, name, "backing_queue_status").sub(key),
                value,
            ));
        }

        for field in QUEUE_COUNTERS {
            let Some(value) = queue.field(field) else {
                continue;
            };
            samples.push(self.sample(MetricKey::queue(vhost, name, field), value));
            if let Some(rate) = queue.rate(field) {
                samples.push(self.sample(MetricKey::queue(vhost, name, field).rate(), rate));
            }
        }

        if let Some(stats) = &queue.message_stats {
            let key = || MetricKey::queue(vhost, name, "message_stats").sub("publish");
            if let Some(value) = stats.get("publish") {
                samples.push(self.sample(key(), value));
            }
            if let Some(rate) = detail_rate(stats, "publish") {
                samples.push(self.sample(key().rate(), rate));
            }
        }
    }

    /// Broker and runtime versions, `Unknown` where the overview is silent
    pub fn overview_metrics(&self, overview: &BrokerOverview) -> Vec<MetricSample> {
        [
            (VERSION_KEY, overview.broker_version()),
            (MANAGEMENT_VERSION_KEY, overview.management_plugin_version()),
            (ERLANG_VERSION_KEY, overview.runtime_version()),
            (ERLANG_FULL_VERSION_KEY, overview.runtime_full_version()),
        ]
        .into_iter()
        .map(|(key, version)| self.sample(MetricKey::global(key), &Value::from(version)))
        .collect()
    }

    /// Heartbeat pair: the agent ran, and which build it is
    pub fn agent_metrics(&self) -> Vec<MetricSample> {
        vec![
            self.sample(MetricKey::global(AGENT_PING_KEY), &Value::from(1)),
            self.sample(
                MetricKey::global(AGENT_VERSION_KEY),
                &Value::from(env!("CARGO_PKG_VERSION")),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionRecord;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};

    fn vhost(doc: Value) -> VhostRecord {
        serde_json::from_value(doc).unwrap()
    }

    fn queue(doc: Value) -> QueueRecord {
        serde_json::from_value(doc).unwrap()
    }

    fn by_key(samples: &[MetricSample]) -> HashMap<String, Value> {
        samples
            .iter()
            .map(|s| (s.key.to_string(), s.value.clone()))
            .collect()
    }

    fn base_queue() -> Value {
        json!({
            "vhost": "/",
            "name": "orders",
            "auto_delete": false,
            "consumers": 2,
            "durable": true,
            "idle_since": "2024-05-01 12:00:00",
            "memory": 14000,
            "status": "running"
        })
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(MetricKey::vhost("/", "messages").to_string(), "rabbitmq.stat.vhost[/,messages]");
        assert_eq!(
            MetricKey::vhost("/", "messages").rate().to_string(),
            "rabbitmq.stat.vhost[/,messages,rate]"
        );
        assert_eq!(
            MetricKey::queue("/", "q1", "message_stats").sub("publish").rate().to_string(),
            "rabbitmq.stat.queue[/,q1,message_stats,publish,rate]"
        );
        assert_eq!(MetricKey::global(VERSION_KEY).to_string(), "rabbitmq.version");
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(coerce(json!(true)), json!(1));
        assert_eq!(coerce(json!(false)), json!(0));
        assert_eq!(coerce(json!(1.5)), json!(1.5));
        assert_eq!(coerce(json!("running")), json!("running"));
        assert_eq!(coerce(Value::Null), Value::Null);
    }

    #[test]
    fn test_vhost_end_to_end() {
        let extractor = MetricExtractor::new("mq01");
        let vhosts = vec![vhost(json!({
            "name": "/",
            "messages": 5,
            "messages_details": {"rate": 1.2},
            "tracing": false
        }))];

        let samples = extractor.extract_vhost_metrics(&vhosts, &ConnectionHistogram::default());
        let values = by_key(&samples);

        assert_eq!(samples.len(), 3 + 8);
        assert_eq!(values["rabbitmq.stat.vhost[/,messages]"], json!(5));
        assert_eq!(values["rabbitmq.stat.vhost[/,messages,rate]"], json!(1.2));
        assert_eq!(values["rabbitmq.stat.vhost[/,tracing]"], json!(false));
        for state in ConnectionState::ALL {
            assert_eq!(values[&format!("rabbitmq.stat.vhost[/,connection_{state}]")], json!(0));
        }
        assert!(samples.iter().all(|s| s.host == "mq01"));
    }

    #[test]
    fn test_vhost_without_message_stats() {
        let extractor = MetricExtractor::new("mq01");
        let vhosts = vec![vhost(json!({"name": "/", "tracing": true}))];
        let connections = vec![ConnectionRecord {
            vhost: "/".to_string(),
            state: ConnectionState::Running,
        }];
        let histogram = ConnectionHistogram::aggregate(&connections);

        let values = by_key(&extractor.extract_vhost_metrics(&vhosts, &histogram));

        assert!(!values.keys().any(|k| k.contains(",confirm") || k.contains(",publish")));
        assert_eq!(values["rabbitmq.stat.vhost[/,tracing]"], json!(true));
        assert_eq!(values["rabbitmq.stat.vhost[/,connection_running]"], json!(1));
        assert_eq!(values["rabbitmq.stat.vhost[/,connection_blocked]"], json!(0));
        assert_eq!(values.len(), 1 + 8);
    }

    #[test]
    fn test_vhost_message_stats_and_counters() {
        let extractor = MetricExtractor::new("mq01");
        let vhosts = vec![vhost(json!({
            "name": "orders",
            "message_stats": {
                "confirm": 40,
                "confirm_details": {"rate": 0.5},
                "publish": 42,
                "publish_details": {"rate": 0.7}
            },
            "messages_ready": 3,
            "messages_ready_details": {"rate": 0.0},
            "messages_unacknowledged": 1,
            "messages_unacknowledged_details": {"rate": 0.1},
            "recv_oct": 1000,
            "recv_oct_details": {"rate": 12.5},
            "send_oct": 2000,
            "send_oct_details": {"rate": 25.0},
            "tracing": false
        }))];

        let values = by_key(&extractor.extract_vhost_metrics(&vhosts, &ConnectionHistogram::default()));

        assert_eq!(values["rabbitmq.stat.vhost[orders,confirm]"], json!(40));
        assert_eq!(values["rabbitmq.stat.vhost[orders,confirm,rate]"], json!(0.5));
        assert_eq!(values["rabbitmq.stat.vhost[orders,publish]"], json!(42));
        assert_eq!(values["rabbitmq.stat.vhost[orders,publish,rate]"], json!(0.7));
        assert_eq!(values["rabbitmq.stat.vhost[orders,recv_oct,rate]"], json!(12.5));
        assert_eq!(values["rabbitmq.stat.vhost[orders,send_oct]"], json!(2000));
        assert!(!values.contains_key("rabbitmq.stat.vhost[orders,messages]"));
        assert!(!values.keys().any(|k| k.contains("_details") || k.contains(",name")));
    }

    #[test]
    fn test_queue_rules() {
        let extractor = MetricExtractor::new("mq01");
        let mut doc = base_queue();
        doc["backing_queue_status"] = json!({
            "q1": 0,
            "len": 7,
            "mode": "default",
            "delta": ["delta", "undefined", 0, 0, "undefined"]
        });
        doc["messages"] = json!(7);
        doc["messages_details"] = json!({"rate": 0.2});
        doc["messages_ready"] = json!(5);
        doc["messages_ready_details"] = json!({"rate": 0.1});
        doc["message_stats"] = json!({"publish": 99, "publish_details": {"rate": 3.5}});

        let values = by_key(&extractor.extract_queue_metrics(&[queue(doc)]));

        assert_eq!(values["rabbitmq.stat.queue[/,orders,auto_delete]"], json!(false));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,durable]"], json!(true));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,consumers]"], json!(2));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,status]"], json!("running"));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,idle_since]"], json!("2024-05-01 12:00:00"));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,memory]"], json!(14000));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,backing_queue_status,len]"], json!(7));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,backing_queue_status,mode]"], json!("default"));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,backing_queue_status,q1]"], json!(0));
        assert!(!values.contains_key("rabbitmq.stat.queue[/,orders,backing_queue_status,delta]"));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,messages,rate]"], json!(0.2));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,messages_ready]"], json!(5));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,messages_ready,rate]"], json!(0.1));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,message_stats,publish]"], json!(99));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,message_stats,publish,rate]"], json!(3.5));
        assert_eq!(values.len(), 6 + 3 + 4 + 2);
    }

    #[test]
    fn test_counter_without_details_has_no_rate() {
        let extractor = MetricExtractor::new("mq01");
        let vhosts = vec![vhost(json!({"name": "/", "messages": 5, "recv_oct": 10}))];
        let values = by_key(&extractor.extract_vhost_metrics(&vhosts, &ConnectionHistogram::default()));

        assert_eq!(values["rabbitmq.stat.vhost[/,messages]"], json!(5));
        assert_eq!(values["rabbitmq.stat.vhost[/,recv_oct]"], json!(10));
        assert!(!values.keys().any(|k| k.ends_with(",rate]")));

        let mut doc = base_queue();
        doc["messages_ready"] = json!(4);
        doc["message_stats"] = json!({"publish": 8});
        let values = by_key(&extractor.extract_queue_metrics(&[queue(doc)]));

        assert_eq!(values["rabbitmq.stat.queue[/,orders,messages_ready]"], json!(4));
        assert_eq!(values["rabbitmq.stat.queue[/,orders,message_stats,publish]"], json!(8));
        assert!(!values.keys().any(|k| k.ends_with(",rate]")));
    }

    #[test]
    fn test_queue_minimal_record() {
        let extractor = MetricExtractor::new("mq01");
        let samples = extractor.extract_queue_metrics(&[queue(base_queue())]);
        assert_eq!(samples.len(), 6);
    }

    #[test]
    fn test_keys_unique_and_idempotent() {
        let extractor = MetricExtractor::new("mq01");
        let vhosts = vec![
            vhost(json!({"name": "/", "messages": 1, "messages_details": {"rate": 0.0}})),
            vhost(json!({"name": "orders", "message_stats": {"publish": 3}})),
        ];
        let mut second = base_queue();
        second["name"] = json!("invoices");
        let queues = vec![queue(base_queue()), queue(second)];
        let histogram = ConnectionHistogram::default();

        let run = || {
            let mut samples = extractor.extract_vhost_metrics(&vhosts, &histogram);
            samples.extend(extractor.extract_queue_metrics(&queues));
            samples
        };
        let first = run();
        let keys: HashSet<String> = first.iter().map(|s| s.key.to_string()).collect();
        assert_eq!(keys.len(), first.len());

        assert_eq!(by_key(&first), by_key(&run()));
    }

    #[test]
    fn test_overview_metrics() {
        let extractor = MetricExtractor::new("mq01");
        let overview: BrokerOverview = serde_json::from_value(json!({
            "rabbitmq_version": "3.12.4",
            "management_version": "3.12.4"
        }))
        .unwrap();

        let values = by_key(&extractor.overview_metrics(&overview));
        assert_eq!(values[VERSION_KEY], json!("3.12.4"));
        assert_eq!(values[MANAGEMENT_VERSION_KEY], json!("3.12.4"));
        assert_eq!(values[ERLANG_VERSION_KEY], json!("Unknown"));
        assert_eq!(values[ERLANG_FULL_VERSION_KEY], json!("Unknown"));
    }

    #[test]
    fn test_agent_metrics() {
        let values = by_key(&MetricExtractor::new("mq01").agent_metrics());
        assert_eq!(values[AGENT_PING_KEY], json!(1));
        assert_eq!(values[AGENT_VERSION_KEY], json!(env!("CARGO_PKG_VERSION")));
    }
}
