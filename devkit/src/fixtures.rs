/*!
JSON fixtures shaped like RabbitMQ management API records

Builders start from a realistic record and let a test add or strip fields.
*/

use serde_json::{json, Map, Value};

/// `/api/overview` document without `erlang_full_version`
pub fn overview(version: &str) -> Value {
    json!({
        "rabbitmq_version": version,
        "management_version": version,
        "erlang_version": "26.2.1",
        "cluster_name": "rabbit@localhost",
        "node": "rabbit@localhost",
    })
}

/// Wrap records into a list response
pub fn list(records: Vec<Value>) -> Value {
    Value::Array(records)
}

/// One `/api/connections` element
pub fn connection(vhost: &str, state: &str) -> Value {
    json!({
        "vhost": vhost,
        "state": state,
        "name": "127.0.0.1:50412 -> 127.0.0.1:5672",
        "user": "guest",
        "protocol": "AMQP 0-9-1",
    })
}

fn with_rate(record: &mut Map<String, Value>, field: &str, value: Value, rate: f64) {
    record.insert(field.to_string(), value);
    record.insert(format!("{field}_details"), json!({ "rate": rate }));
}

/// Builds one `/api/vhosts` element
pub struct VhostBuilder {
    record: Map<String, Value>,
    message_stats: Option<Map<String, Value>>,
}

impl VhostBuilder {
    pub fn new(name: &str) -> Self {
        let mut record = Map::new();
        record.insert("name".to_string(), json!(name));
        record.insert("tracing".to_string(), json!(false));
        Self {
            record,
            message_stats: None,
        }
    }

    /// Top-level counter plus its `<field>_details.rate`
    pub fn counter(mut self, field: &str, value: Value, rate: f64) -> Self {
        with_rate(&mut self.record, field, value, rate);
        self
    }

    pub fn message_stats(
        mut self,
        confirm: u64,
        confirm_rate: f64,
        publish: u64,
        publish_rate: f64,
    ) -> Self {
        let mut stats = Map::new();
        with_rate(&mut stats, "confirm", json!(confirm), confirm_rate);
        with_rate(&mut stats, "publish", json!(publish), publish_rate);
        self.message_stats = Some(stats);
        self
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.record.insert("tracing".to_string(), json!(enabled));
        self
    }

    pub fn build(self) -> Value {
        let mut record = self.record;
        if let Some(stats) = self.message_stats {
            record.insert("message_stats".to_string(), Value::Object(stats));
        }
        Value::Object(record)
    }
}

/// Builds one `/api/queues` element with every field the agent requires
pub struct QueueBuilder {
    record: Map<String, Value>,
}

impl QueueBuilder {
    pub fn new(vhost: &str, name: &str) -> Self {
        let record = json!({
            "vhost": vhost,
            "name": name,
            "auto_delete": false,
            "consumers": 0,
            "durable": true,
            "idle_since": "2024-01-01 00:00:00",
            "memory": 10_000,
            "status": "running",
            "backing_queue_status": {},
        });
        Self {
            record: record.as_object().cloned().unwrap_or_default(),
        }
    }

    pub fn field(mut self, field: &str, value: Value) -> Self {
        self.record.insert(field.to_string(), value);
        self
    }

    /// Entry of `backing_queue_status`
    pub fn backing(mut self, key: &str, value: Value) -> Self {
        if let Some(Value::Object(status)) = self.record.get_mut("backing_queue_status") {
            status.insert(key.to_string(), value);
        }
        self
    }

    pub fn messages(mut self, value: Value, rate: f64) -> Self {
        with_rate(&mut self.record, "messages", value, rate);
        self
    }

    pub fn publish(mut self, count: u64, rate: f64) -> Self {
        let mut stats = Map::new();
        with_rate(&mut stats, "publish", json!(count), rate);
        self.record
            .insert("message_stats".to_string(), Value::Object(stats));
        self
    }

    /// Drop a field, e.g. to produce a malformed record
    pub fn without(mut self, field: &str) -> Self {
        self.record.remove(field);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.record)
    }
}
