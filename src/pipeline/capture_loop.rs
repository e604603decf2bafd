//! The capture loop: one interface, one thread, one session.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use super::{LoopState, LoopStats, LoopStatsSnapshot};
use crate::capture::{
    CaptureBackend, CaptureOptions, CaptureSession, DeviceDescriptor, DeviceSelector,
};
use crate::classifier::classify;
use crate::domain::{ClassificationEvent, RawPacket};
use crate::error::{CaptureError, LoopError};
use crate::publisher::{EventPublisher, PublishOutcome};

/// State shared between the owner and the capture thread.
struct Shared {
    transitions: Mutex<Vec<LoopState>>,
    stop: AtomicBool,
    stats: LoopStats,
}

impl Shared {
    fn new() -> Self {
        Self {
            transitions: Mutex::new(vec![LoopState::Stopped]),
            stop: AtomicBool::new(false),
            stats: LoopStats::default(),
        }
    }

    fn transitions(&self) -> MutexGuard<'_, Vec<LoopState>> {
        self.transitions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> LoopState {
        self.transitions().last().copied().unwrap_or(LoopState::Stopped)
    }

    fn transition(&self, to: LoopState) {
        let mut transitions = self.transitions();
        let from = transitions.last().copied().unwrap_or(LoopState::Stopped);
        transitions.push(to);
        tracing::debug!(%from, %to, "Capture loop state change");
    }
}

/// Captures packets from one device, classifies them and publishes
/// everything that is not unrecognized.
///
/// A loop runs at most once. After it stops or faults, build a new one
/// to capture again.
pub struct CaptureLoop<P: EventPublisher + 'static> {
    selector: Option<Box<dyn DeviceSelector>>,
    backend: Option<Box<dyn CaptureBackend>>,
    publisher: Option<P>,
    options: CaptureOptions,
    shared: Arc<Shared>,
    device: Option<DeviceDescriptor>,
    thread: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl<P: EventPublisher + 'static> CaptureLoop<P> {
    pub fn new(
        selector: Box<dyn DeviceSelector>,
        backend: Box<dyn CaptureBackend>,
        publisher: P,
    ) -> Self {
        Self {
            selector: Some(selector),
            backend: Some(backend),
            publisher: Some(publisher),
            options: CaptureOptions::default(),
            shared: Arc::new(Shared::new()),
            device: None,
            thread: None,
        }
    }

    /// Override snapshot length, promiscuity and read timeout.
    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    /// Every state the loop has been in, oldest first.
    pub fn transitions(&self) -> Vec<LoopState> {
        self.shared.transitions().clone()
    }

    pub fn stats(&self) -> LoopStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// The device chosen at startup, once `start` got that far.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Whether the capture thread is still reading packets.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Select and open a device, then start capturing on a new thread.
    ///
    /// Enumeration and open failures are returned here and leave the loop
    /// `Faulted`; nothing is retried.
    pub fn start(&mut self) -> Result<(), LoopError> {
        let (Some(selector), Some(mut backend), Some(publisher)) =
            (self.selector.take(), self.backend.take(), self.publisher.take())
        else {
            return Err(LoopError::AlreadyStarted);
        };

        self.shared.transition(LoopState::Opening);

        let device = match select_device(selector.as_ref()) {
            Ok(device) => device,
            Err(e) => return Err(self.fault(e)),
        };
        tracing::info!("Using network device: {}", device.name);

        let source = match backend.open(&device, &self.options) {
            Ok(source) => source,
            Err(e) => return Err(self.fault(e)),
        };

        let worker = LoopWorker {
            session: CaptureSession::new(device.clone(), source),
            publisher,
            local: device.addresses.clone(),
            shared: self.shared.clone(),
        };
        self.device = Some(device);
        self.shared.transition(LoopState::Running);

        let name = format!("capture-{}", worker.session.device_identifier());
        match thread::Builder::new().name(name).spawn(move || worker.run()) {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The unspawned closure was dropped, taking the session with it.
                tracing::error!("Failed to spawn capture thread: {}", e);
                self.shared.transition(LoopState::Faulted);
                Err(LoopError::Spawn(e))
            }
        }
    }

    /// Request a stop and wait for the capture thread to release the device.
    ///
    /// The request is seen within one read timeout. Returns the read error
    /// that ended the loop, if it ended on its own.
    pub fn stop(&mut self) -> Result<(), LoopError> {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the capture thread to end without requesting a stop.
    pub fn wait(&mut self) -> Result<(), LoopError> {
        self.join()
    }

    fn join(&mut self) -> Result<(), LoopError> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        match handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LoopError::Terminated(e)),
            Err(_) => {
                // The session was released while unwinding.
                tracing::error!("Capture thread panicked");
                if self.shared.state() != LoopState::Stopping {
                    self.shared.transition(LoopState::Stopping);
                }
                self.shared.transition(LoopState::Stopped);
                Err(LoopError::Panicked)
            }
        }
    }

    fn fault(&self, e: CaptureError) -> LoopError {
        tracing::error!("Capture startup failed: {}", e);
        self.shared.transition(LoopState::Faulted);
        LoopError::Faulted(e)
    }
}

impl<P: EventPublisher + 'static> Drop for CaptureLoop<P> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn select_device(selector: &dyn DeviceSelector) -> Result<DeviceDescriptor, CaptureError> {
    let devices = selector.list_devices()?;
    if devices.is_empty() {
        return Err(CaptureError::NoDevicesFound);
    }
    selector.select_device(devices)
}

/// Everything the capture thread owns.
struct LoopWorker<P> {
    session: CaptureSession,
    publisher: P,
    local: Vec<IpAddr>,
    shared: Arc<Shared>,
}

impl<P: EventPublisher> LoopWorker<P> {
    fn run(mut self) -> Result<(), CaptureError> {
        tracing::info!(device = %self.session.device_identifier(), "Packet capturing started");

        let outcome = loop {
            if self.shared.stop.load(Ordering::SeqCst) {
                break Ok(());
            }

            match self.session.next_packet() {
                Ok(Some(packet)) => self.process(&packet),
                Ok(None) => self.shared.stats.record_timeout(),
                Err(e) => break Err(e),
            }
        };

        self.shared.transition(LoopState::Stopping);
        match &outcome {
            Ok(()) => tracing::info!("Stop requested, closing capture"),
            Err(e) => tracing::error!(
                device = %self.session.device_identifier(),
                "Capture failed, stopping: {}",
                e
            ),
        }

        self.session.close();
        self.shared.transition(LoopState::Stopped);

        let stats = self.shared.stats.snapshot();
        tracing::info!(
            packets = stats.packets,
            published = stats.published,
            skipped = stats.skipped,
            rejected = stats.rejected,
            "Packet capturing stopped"
        );

        outcome
    }

    fn process(&self, packet: &RawPacket) {
        let stats = &self.shared.stats;
        stats.record_packet();

        let protocol = classify(packet);
        if !protocol.is_publishable() {
            stats.record_skipped();
            tracing::debug!("Skipping packet - no recognizable protocol");
            return;
        }

        tracing::debug!(%protocol, size = packet.len(), "Captured packet");
        let event = ClassificationEvent::from_packet(packet, protocol, &self.local);
        match self.publisher.publish(event) {
            PublishOutcome::Enqueued => stats.record_published(),
            PublishOutcome::Dropped | PublishOutcome::Closed => stats.record_rejected(),
        }
    }
}
