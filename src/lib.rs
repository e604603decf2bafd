//! pktstream - live packet protocol classification streamed to a broker.
//!
//! A `CaptureLoop` reads packets from one interface, `classify` labels
//! each one, and a bounded `Publisher` hands the labels to a
//! `StreamSink` on its own worker thread.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod publisher;

pub use capture::{CaptureOptions, DeviceDescriptor, DeviceSelector, PnetBackend, PnetDeviceSelector};
pub use classifier::classify;
pub use config::Config;
pub use domain::{ClassificationEvent, Direction, ProtocolLabel, RawPacket};
pub use error::{CaptureError, ConfigError, LoopError, PublishError};
pub use pipeline::{CaptureLoop, LoopState};
pub use publisher::{EventPublisher, Publisher, PublishOutcome, StreamSink, TOPIC};
