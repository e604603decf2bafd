//! Sink that writes records to the log instead of a broker.

use serde_json::Value;

use super::StreamSink;
use crate::error::PublishError;

/// Logs each record at info level. Used when no broker is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl StreamSink for LogSink {
    fn send(&self, topic: &str, key: &str, value: &Value) -> Result<(), PublishError> {
        match value {
            Value::String(label) if label == key => {
                tracing::info!(topic, "Captured protocol: {}", key);
            }
            _ => {
                tracing::info!(topic, key, value = %value, "Captured protocol: {}", key);
            }
        }
        Ok(())
    }
}
