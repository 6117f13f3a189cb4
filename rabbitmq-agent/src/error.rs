//! Error types for the RabbitMQ agent
//!
//! Nothing here crosses a poll cycle boundary: the API client turns every
//! request-level error into a logged absence, and record-level errors only
//! cause the offending record to be skipped.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Connection refused, DNS failure, timeout and friends.
    #[error("could not connect to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The management API answered with anything but 200.
    #[error("received {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The body was not valid JSON.
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A single record in a response lacked a field or had the wrong shape.
    #[error("malformed {kind} record: {reason}")]
    MalformedRecord { kind: &'static str, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The TLS client identity could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
