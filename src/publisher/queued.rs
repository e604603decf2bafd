//! Bounded queue publisher with a dedicated delivery worker.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::{EventPublisher, PayloadFormat, PublishOutcome, StreamSink, TOPIC};
use crate::domain::ClassificationEvent;

/// How often the idle worker checks for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Upper bound for a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Queue drops are logged on the first one and then every this many.
const DROP_LOG_EVERY: u64 = 1000;

/// Publisher tuning.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub payload: PayloadFormat,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            payload: PayloadFormat::Label,
        }
    }
}

impl PublisherConfig {
    /// Delay before retry number `attempt` (zero based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_backoff
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }
}

/// Delivery counters shared by the handle and the worker.
#[derive(Debug, Default)]
pub struct PublisherStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of `PublisherStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
    pub discarded: u64,
}

impl PublisherStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the outbound queue. Cheap to clone.
#[derive(Clone)]
pub struct Publisher {
    tx: Sender<ClassificationEvent>,
    stats: Arc<PublisherStats>,
}

impl Publisher {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl EventPublisher for Publisher {
    fn publish(&self, event: ClassificationEvent) -> PublishOutcome {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Enqueued
            }
            Err(TrySendError::Full(event)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
                    tracing::warn!(
                        dropped,
                        protocol = %event.protocol,
                        "Outbound queue full, dropping event"
                    );
                }
                PublishOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => PublishOutcome::Closed,
        }
    }
}

/// Owner of the delivery thread.
pub struct PublisherWorker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
    queue: Receiver<ClassificationEvent>,
    shutting_down: Arc<AtomicBool>,
    stats: Arc<PublisherStats>,
}

impl PublisherWorker {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the worker, draining for at most `drain_timeout`.
    ///
    /// Pending retries are abandoned. If the sink is still stuck when the
    /// deadline passes, whatever is left in the queue is discarded and the
    /// thread is detached.
    pub fn shutdown(self, drain_timeout: Duration) -> StatsSnapshot {
        self.shutting_down.store(true, Ordering::SeqCst);

        match self.done.recv_timeout(drain_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    tracing::error!("Publisher worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let mut discarded = 0u64;
                while self.queue.try_recv().is_ok() {
                    discarded += 1;
                }
                self.stats.discarded.fetch_add(discarded, Ordering::Relaxed);
                tracing::warn!(
                    discarded,
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "Publisher did not drain in time, discarding pending events"
                );
            }
        }

        self.stats.snapshot()
    }
}

/// Start a publisher delivering into `sink` on its own thread.
pub fn spawn(
    sink: Box<dyn StreamSink>,
    config: PublisherConfig,
) -> io::Result<(Publisher, PublisherWorker)> {
    let (tx, rx) = bounded(config.queue_capacity);
    let (done_tx, done_rx) = bounded(1);
    let stats = Arc::new(PublisherStats::default());
    let shutting_down = Arc::new(AtomicBool::new(false));

    let worker = Worker {
        rx: rx.clone(),
        sink,
        config,
        stats: stats.clone(),
        shutting_down: shutting_down.clone(),
    };

    let handle = thread::Builder::new()
        .name("publisher".to_string())
        .spawn(move || {
            worker.run();
            let _ = done_tx.send(());
        })?;

    let publisher = Publisher {
        tx,
        stats: stats.clone(),
    };
    let worker = PublisherWorker {
        handle,
        done: done_rx,
        queue: rx,
        shutting_down,
        stats,
    };

    Ok((publisher, worker))
}

struct Worker {
    rx: Receiver<ClassificationEvent>,
    sink: Box<dyn StreamSink>,
    config: PublisherConfig,
    stats: Arc<PublisherStats>,
    shutting_down: Arc<AtomicBool>,
}

impl Worker {
    fn run(&self) {
        tracing::debug!(topic = TOPIC, "Publisher worker started");

        loop {
            match self.rx.recv_timeout(IDLE_POLL) {
                Ok(event) => self.deliver(&event),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutting_down.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::debug!("Publisher worker stopped");
    }

    fn deliver(&self, event: &ClassificationEvent) {
        let value = match self.config.payload.value(event) {
            Ok(value) => value,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(protocol = %event.protocol, "Dropping event: {}", e);
                return;
            }
        };

        let mut attempt = 0;
        loop {
            match self.sink.send(TOPIC, event.key(), &value) {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    if attempt >= self.config.max_retries
                        || self.shutting_down.load(Ordering::SeqCst)
                    {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            protocol = %event.protocol,
                            attempts = attempt + 1,
                            "Failed to publish event: {}",
                            e
                        );
                        return;
                    }
                    let delay = self.config.backoff(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying publish: {}", e);
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
