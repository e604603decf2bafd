//! Event publishing module.
//!
//! The capture loop talks to an `EventPublisher`, which only enqueues.
//! A worker thread drains the queue into a `StreamSink` that owns the
//! actual broker I/O.

mod log_sink;
mod queued;
mod rest_proxy_sink;

#[cfg(test)]
pub(crate) mod mock;

pub use log_sink::LogSink;
pub use queued::{spawn, Publisher, PublisherConfig, PublisherStats, PublisherWorker, StatsSnapshot};
pub use rest_proxy_sink::{RestProxySink, DEFAULT_REQUEST_TIMEOUT};

use std::str::FromStr;

use serde_json::Value;

use crate::domain::ClassificationEvent;
use crate::error::PublishError;

/// Broker topic all classification events go to.
pub const TOPIC: &str = "network-traffic";

/// Result of handing one event to a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Accepted into the outbound queue
    Enqueued,
    /// Rejected because the queue was full
    Dropped,
    /// The publisher no longer accepts events
    Closed,
}

/// Accepts classification events without blocking the caller.
pub trait EventPublisher: Send {
    fn publish(&self, event: ClassificationEvent) -> PublishOutcome;
}

/// External streaming system the worker delivers to.
pub trait StreamSink: Send {
    /// Deliver one record. Called from the publisher worker only.
    fn send(&self, topic: &str, key: &str, value: &Value) -> Result<(), PublishError>;
}

/// What goes into the record value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// The protocol label string, same as the key
    #[default]
    Label,
    /// The full traffic record as a JSON object
    Record,
}

impl PayloadFormat {
    pub fn value(&self, event: &ClassificationEvent) -> Result<Value, PublishError> {
        match self {
            Self::Label => Ok(Value::String(event.key().to_string())),
            Self::Record => Ok(serde_json::to_value(event)?),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label" => Ok(Self::Label),
            "record" => Ok(Self::Record),
            other => Err(format!("unknown payload format '{}' (expected label or record)", other)),
        }
    }
}
