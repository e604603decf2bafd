//! Publisher and sink doubles for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde_json::Value;

use super::{EventPublisher, PublishOutcome, StreamSink};
use crate::domain::ClassificationEvent;
use crate::error::PublishError;

#[derive(Debug, Clone, PartialEq)]
pub struct SentRecord {
    pub topic: String,
    pub key: String,
    pub value: Value,
}

/// Records everything it is asked to send.
#[derive(Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<SentRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Arc<Mutex<Vec<SentRecord>>> {
        self.records.clone()
    }
}

impl StreamSink for RecordingSink {
    fn send(&self, topic: &str, key: &str, value: &Value) -> Result<(), PublishError> {
        self.records.lock().unwrap().push(SentRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(())
    }
}

/// Blocks every send until the returned sender is dropped.
pub struct BlockingSink {
    release: Receiver<()>,
}

impl BlockingSink {
    pub fn new() -> (Self, Sender<()>) {
        let (tx, rx) = bounded(0);
        (Self { release: rx }, tx)
    }
}

impl StreamSink for BlockingSink {
    fn send(&self, _topic: &str, _key: &str, _value: &Value) -> Result<(), PublishError> {
        let _ = self.release.recv();
        Err(PublishError::Transport("broker unreachable".to_string()))
    }
}

/// Fails the first `failures` sends, then succeeds.
pub struct FlakySink {
    failures: u32,
    attempts: Arc<AtomicU32>,
}

impl FlakySink {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

impl StreamSink for FlakySink {
    fn send(&self, _topic: &str, _key: &str, _value: &Value) -> Result<(), PublishError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(PublishError::Rejected { status: 503 })
        } else {
            Ok(())
        }
    }
}

/// Counts `publish` calls and keeps the events.
#[derive(Clone, Default)]
pub struct CountingPublisher {
    events: Arc<Mutex<Vec<ClassificationEvent>>>,
}

impl CountingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<ClassificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for CountingPublisher {
    fn publish(&self, event: ClassificationEvent) -> PublishOutcome {
        self.events.lock().unwrap().push(event);
        PublishOutcome::Enqueued
    }
}
