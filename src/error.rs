//! Error types for each layer of the pipeline.

use thiserror::Error;

/// Errors raised by device selection and the capture backend.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No capturable network devices found")]
    NoDevicesFound,

    #[error("Failed to enumerate network devices: {0}")]
    Enumeration(String),

    #[error("Network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Insufficient permissions to capture on '{0}' (try running as root or with CAP_NET_RAW)")]
    InsufficientPermissions(String),

    #[error("Failed to open capture channel on '{device}': {reason}")]
    ChannelCreation { device: String, reason: String },

    #[error("Capture read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Errors raised while handing an event to the broker.
///
/// These never leave the publisher: they are logged and counted there.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Broker rejected record with status {status}")]
    Rejected { status: u16 },
}

/// Errors from the capture loop lifecycle.
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Capture loop was already started")]
    AlreadyStarted,

    #[error("Capture loop faulted: {0}")]
    Faulted(#[source] CaptureError),

    #[error("Capture loop terminated: {0}")]
    Terminated(#[source] CaptureError),

    #[error("Capture thread panicked")]
    Panicked,

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}
