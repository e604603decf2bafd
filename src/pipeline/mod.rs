//! Capture-classify-publish pipeline.
//!
//! `CaptureLoop` owns the interface lifecycle and drives the
//! classifier and publisher for every packet it reads.

mod capture_loop;

pub use capture_loop::CaptureLoop;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of a capture loop.
///
/// `Stopped -> Opening -> Running -> Stopping -> Stopped`, or
/// `Opening -> Faulted` when no device can be selected or opened.
/// `Faulted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Opening,
    Running,
    Stopping,
    Faulted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "STOPPED",
            Self::Opening => "OPENING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Faulted => "FAULTED",
        };
        f.write_str(name)
    }
}

/// Per-loop packet counters.
#[derive(Debug, Default)]
pub struct LoopStats {
    packets: AtomicU64,
    published: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time copy of `LoopStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStatsSnapshot {
    /// Packets read from the interface
    pub packets: u64,
    /// Events accepted by the publisher
    pub published: u64,
    /// Unrecognized packets, never published
    pub skipped: u64,
    /// Events the publisher refused (queue full or closed)
    pub rejected: u64,
    /// Reads that timed out with no packet
    pub timeouts: u64,
}

impl LoopStats {
    pub(crate) fn record_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
